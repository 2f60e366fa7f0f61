use markmatch_core::doc::{flatten, parse_document, parse_slice, to_html, Node};
use markmatch_core::{
    apply_suggestion_across, DocumentStrategy, Editor, HtmlStrategy, MatchRange, MatchStrategy,
    Selection, SelectionRestore,
};
use pretty_assertions::assert_eq;

fn two_paragraphs() -> Node {
    parse_document("<p>Hello world</p><p>Goodbye</p>")
}

#[test]
fn flattened_positions_point_back_at_their_chars() {
    let doc = two_paragraphs();
    let flat = flatten(&doc);
    assert_eq!(flat.as_string(), "Hello world Goodbye");
    for (c, entry) in flat.text.iter().zip(&flat.pos_map) {
        if entry.node_size == 0 {
            assert_eq!(*c, ' ', "separator at {}", entry.pos);
            continue;
        }
        let slice = doc.text_between(entry.pos, entry.pos + entry.node_size, "");
        assert_eq!(slice, c.to_string(), "char at {}", entry.pos);
    }
}

#[test]
fn replacement_changes_size_by_inserted_minus_removed() {
    let doc = parse_document("<h1>Terms</h1><p>Payment is due in 30 days.</p><p>Late fees apply.</p>");
    let before = flatten(&doc).as_string();
    let mut editor = Editor::new(doc.clone());

    let slice = parse_slice("<strong>forty-five</strong>").unwrap();
    let commit = apply_suggestion_across(&mut editor, "30", "<strong>forty-five</strong>").unwrap();
    let range = commit.applied[0];
    assert_eq!(
        editor.doc().content_size() as isize - doc.content_size() as isize,
        slice.size() as isize - range.len() as isize
    );

    let after = flatten(editor.doc()).as_string();
    assert_eq!(after, before.replace("30", "forty-five"));
    assert_eq!(
        editor.to_html(),
        "<h1>Terms</h1><p>Payment is due in <strong>forty-five</strong> days.</p><p>Late fees apply.</p>"
    );
}

#[test]
fn block_replacement_changes_size_by_inserted_minus_removed() {
    let doc = two_paragraphs();
    let mut editor = Editor::new(doc.clone());

    let slice = parse_slice("<ul><li>item</li></ul>").unwrap();
    let commit = apply_suggestion_across(&mut editor, "world", "<ul><li>item</li></ul>").unwrap();
    let range = commit.applied[0];
    assert_eq!(
        editor.doc().content_size() as isize - doc.content_size() as isize,
        slice.size() as isize - range.len() as isize
    );
    assert_eq!(
        editor.to_html(),
        "<p>Hello </p><ul><li><p>item</p></li></ul><p>Goodbye</p>"
    );
}

#[test]
fn replacement_spanning_blocks_keeps_surroundings() {
    let mut editor = Editor::from_html("<p>Hello world</p><p>Goodbye</p><p>Untouched</p>");
    let commit = apply_suggestion_across(&mut editor, "world goodbye", "there").unwrap();
    assert_eq!(commit.size_before - commit.size_after, 14 - 5);
    assert_eq!(editor.to_html(), "<p>Hello there</p><p>Untouched</p>");
}

#[test]
fn restore_is_a_separate_caller_step() {
    let mut editor = Editor::from_html("<p>Hello world</p>");
    editor.set_selection(Selection::new(7, 12));
    let commit = apply_suggestion_across(&mut editor, "world", "everyone").unwrap();
    assert_eq!(editor.selection(), Selection::new(7, 12));

    let restored = editor.restore_selection(&commit);
    assert_eq!(restored, SelectionRestore::Restored(Selection::new(7, 12)));
}

#[test]
fn strategies_share_one_interface() {
    fn highlight<S: MatchStrategy>(strategy: &S, content: &S::Content, phrase: &str) -> (Vec<MatchRange>, S::Content) {
        let ranges = strategy.find_matches(content, phrase);
        let annotated = strategy.annotate(content, &ranges);
        (ranges, annotated)
    }

    let html = "<p>fee and fee</p>".to_string();
    let (flat_ranges, flat) = highlight(&HtmlStrategy::default(), &html, "fee");
    let (tree_ranges, tree) = highlight(&DocumentStrategy::default(), &parse_document(&html), "fee");

    assert_eq!(flat_ranges, vec![MatchRange::new(3, 6), MatchRange::new(11, 14)]);
    assert_eq!(tree_ranges, vec![MatchRange::new(1, 4), MatchRange::new(9, 12)]);
    assert_eq!(flat, to_html(&tree));
}
