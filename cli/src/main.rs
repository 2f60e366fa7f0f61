use std::{
    env, fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use console::style;
use globset::{Glob, GlobSet, GlobSetBuilder};
use markmatch_core::doc::{find_text_ranges, parse_document};
use markmatch_core::{
    add_marks_word_by_word, apply_suggestion_across, highlight_findings, parse_results, tokenize,
    AnnotateMode, ComplianceResult, Config, Editor, MarkPolicy, MatchRange, SelectionRestore,
};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// markmatch CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "markmatch",
    about = "Highlight compliance findings in HTML and apply suggested fixes."
)]
struct Args {
    /// Path to config file (YAML). Defaults to markmatch.yml if present.
    #[arg(long, global = true, default_value = "markmatch.yml")]
    config: PathBuf,

    /// Set config overrides (repeatable as key=value). Example: --set highlight.policy=split-around-tags
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", num_args = 0..)]
    sets: Vec<String>,

    /// Emit JSON output for automation.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins when set.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Wrap every non-compliant finding in a <mark> element.
    Annotate(AnnotateArgs),
    /// Replace findings with their suggestions in the document model.
    Resolve(ResolveArgs),
    /// Print document positions of a phrase.
    Find(FindArgs),
    /// Dump the flat HTML token stream.
    Tokens(TokensArgs),
}

#[derive(Debug, ClapArgs)]
struct AnnotateArgs {
    /// Findings JSON (array of {original, compliant, suggestion}). Use - for stdin.
    #[arg(long, value_name = "JSON")]
    findings: PathBuf,

    /// Write annotated files under this directory instead of stdout.
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Exit non-zero when any finding was highlighted.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// HTML files or directories to annotate.
    #[arg(value_name = "PATH", default_value = ".", num_args = 0..)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, ClapArgs)]
struct ResolveArgs {
    /// Findings JSON with suggestions. Use - for stdin.
    #[arg(long, value_name = "JSON")]
    findings: PathBuf,

    /// Add highlight marks instead of replacing text.
    #[arg(long, action = ArgAction::SetTrue)]
    highlight_only: bool,

    /// Write the resulting HTML here instead of stdout.
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// HTML document to resolve.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Debug, ClapArgs)]
struct FindArgs {
    /// Phrase to search for (repeatable).
    #[arg(long, value_name = "TEXT", required = true)]
    phrase: Vec<String>,

    /// HTML document to search.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Debug, ClapArgs)]
struct TokensArgs {
    /// HTML file to tokenize.
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[derive(Debug, Serialize)]
struct AnnotatedFile {
    path: String,
    marks_added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnnotateReport {
    files: Vec<AnnotatedFile>,
    findings: usize,
    total_marks: usize,
}

#[derive(Debug, Serialize)]
struct ResolvedFinding {
    original: String,
    suggestion: Option<String>,
    applied: Vec<MatchRange>,
    skipped: Vec<MatchRange>,
    selection: Option<SelectionRestore>,
}

#[derive(Debug, Serialize)]
struct ResolveReport {
    path: String,
    resolved: Vec<ResolvedFinding>,
    highlighted: usize,
    size_before: usize,
    size_after: usize,
    html: String,
}

#[derive(Debug, Serialize)]
struct FoundPhrase {
    phrase: String,
    from: usize,
    to: usize,
    text: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let (mut cfg, config_root) = load_config(&args.config)?;
    apply_overrides(&mut cfg, &args.sets)?;
    debug!(?cfg, "configuration loaded");

    match &args.command {
        Command::Annotate(cmd) => run_annotate(&args, cmd, &cfg, &config_root),
        Command::Resolve(cmd) => run_resolve(&args, cmd, &cfg),
        Command::Find(cmd) => run_find(&args, cmd),
        Command::Tokens(cmd) => run_tokens(&args, cmd),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run_annotate(args: &Args, cmd: &AnnotateArgs, cfg: &Config, config_root: &Path) -> anyhow::Result<()> {
    let results = read_findings(&cmd.findings)?;
    let actionable = results.iter().filter(|r| r.is_actionable()).count();
    let options = cfg.annotate_options();

    let ignore = build_ignore_set(&cfg.files.ignore_globs)?;
    let mut files = collect_files(&cmd.paths, ignore.as_ref(), &cfg.files.extensions)?;
    files.sort();
    if files.is_empty() {
        warn!("no HTML files matched the given paths");
    }

    let mut reports = Vec::new();
    let mut total_marks = 0usize;
    for path in files {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let annotated = add_marks_word_by_word(&content, &results, &options);
        let marks_added = count_marks(&annotated).saturating_sub(count_marks(&content));
        total_marks += marks_added;

        let output_path = match &cmd.out_dir {
            Some(dir) => {
                let target = dir.join(relative_output(&path, config_root));
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                fs::write(&target, &annotated)
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                Some(target)
            }
            None => None,
        };

        if !args.json {
            print_annotated(&path, marks_added, output_path.as_deref(), &annotated);
        }
        reports.push(AnnotatedFile {
            path: path.to_string_lossy().to_string(),
            marks_added,
            html: output_path.is_none().then(|| annotated.clone()),
            output_path: output_path.map(|p| p.to_string_lossy().to_string()),
        });
    }

    let file_count = reports.len();
    let report = AnnotateReport {
        files: reports,
        findings: actionable,
        total_marks,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprintln!(
            "\n{} files, {} actionable findings, {} marks added",
            file_count, actionable, total_marks
        );
    }

    if cmd.strict && total_marks > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_resolve(args: &Args, cmd: &ResolveArgs, cfg: &Config) -> anyhow::Result<()> {
    let results = read_findings(&cmd.findings)?;
    let html = fs::read_to_string(&cmd.path)
        .with_context(|| format!("Failed to read {}", cmd.path.display()))?;
    let mut editor = Editor::from_html(&html);
    let size_before = editor.doc().content_size();

    let mut resolved = Vec::new();
    let mut highlighted = 0;
    if cmd.highlight_only {
        highlighted = highlight_findings(&mut editor, &results, &cfg.document.highlight_color);
    } else {
        for finding in results.iter().filter(|r| r.is_actionable()) {
            resolved.push(resolve_one(&mut editor, finding, cfg.document.restore_selection));
        }
    }

    let output = editor.to_html();
    let report = ResolveReport {
        path: cmd.path.to_string_lossy().to_string(),
        resolved,
        highlighted,
        size_before,
        size_after: editor.doc().content_size(),
        html: output,
    };

    if let Some(out) = &cmd.out {
        fs::write(out, &report.html).with_context(|| format!("Failed to write {}", out.display()))?;
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_resolve_summary(&report);
    if cmd.out.is_none() {
        println!("{}", report.html);
    }
    Ok(())
}

fn resolve_one(editor: &mut Editor, finding: &ComplianceResult, restore: bool) -> ResolvedFinding {
    let mut entry = ResolvedFinding {
        original: finding.original.clone(),
        suggestion: finding.suggestion.clone(),
        applied: Vec::new(),
        skipped: Vec::new(),
        selection: None,
    };
    let Some(suggestion) = finding.suggestion.as_deref().filter(|s| !s.trim().is_empty()) else {
        debug!(original = %finding.original, "finding has no suggestion");
        return entry;
    };
    if let Some(commit) = apply_suggestion_across(editor, &finding.original, suggestion) {
        if restore {
            entry.selection = Some(editor.restore_selection(&commit));
        }
        entry.applied = commit.applied;
        entry.skipped = commit.skipped;
    }
    entry
}

fn run_find(args: &Args, cmd: &FindArgs) -> anyhow::Result<()> {
    let html = fs::read_to_string(&cmd.path)
        .with_context(|| format!("Failed to read {}", cmd.path.display()))?;
    let doc = parse_document(&html);

    let mut found = Vec::new();
    for phrase in &cmd.phrase {
        for range in find_text_ranges(&doc, phrase) {
            found.push(FoundPhrase {
                phrase: phrase.clone(),
                from: range.from,
                to: range.to,
                text: doc.text_between(range.from, range.to, " "),
            });
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }
    if found.is_empty() {
        println!("{}", style("no matches").dim());
        return Ok(());
    }
    for hit in &found {
        println!(
            "{} {}..{}  {}",
            style(&hit.phrase).bold(),
            hit.from,
            hit.to,
            style(format!("{:?}", hit.text)).cyan()
        );
    }
    Ok(())
}

fn run_tokens(args: &Args, cmd: &TokensArgs) -> anyhow::Result<()> {
    let html = fs::read_to_string(&cmd.path)
        .with_context(|| format!("Failed to read {}", cmd.path.display()))?;
    let tokens = tokenize(&html);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
        return Ok(());
    }
    for token in &tokens {
        println!(
            "{:>6}..{:<6} {:<10} {:?}",
            token.start,
            token.end,
            style(format!("{:?}", token.kind)).yellow(),
            token.text
        );
    }
    Ok(())
}

fn read_findings(path: &Path) -> anyhow::Result<Vec<ComplianceResult>> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read findings from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read findings {}", path.display()))?
    };
    parse_results(&text).with_context(|| format!("Invalid findings in {}", path.display()))
}

fn count_marks(html: &str) -> usize {
    html.matches("</mark>").count()
}

fn relative_output(path: &Path, root: &Path) -> PathBuf {
    match pathdiff::diff_paths(path, root) {
        Some(rel) if !rel.starts_with("..") && rel.is_relative() => rel,
        _ => path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("annotated.html")),
    }
}

fn build_ignore_set(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid ignore glob {pattern}"))?);
    }
    Ok(Some(builder.build()?))
}

fn collect_files(
    paths: &[PathBuf],
    ignore: Option<&GlobSet>,
    extensions: &[String],
) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut walker = WalkDir::new(path).into_iter();
            while let Some(entry_res) = walker.next() {
                let entry = entry_res?;
                let entry_path = entry.path();
                if let Some(set) = ignore {
                    if set.is_match(entry_path) {
                        if entry.file_type().is_dir() {
                            walker.skip_current_dir();
                        }
                        continue;
                    }
                }
                if entry.file_type().is_file() && is_supported(entry_path, extensions) {
                    files.push(entry_path.to_path_buf());
                }
            }
        } else if path.is_file() {
            if ignore.is_some_and(|set| set.is_match(path)) {
                continue;
            }
            files.push(path.clone());
        } else {
            warn!(path = %path.display(), "path does not exist");
        }
    }
    Ok(files)
}

fn is_supported(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

fn load_config(path: &Path) -> anyhow::Result<(Config, PathBuf)> {
    if path.exists() {
        let cfg = Config::load(path)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => env::current_dir()?,
        };
        Ok((cfg, dir))
    } else {
        Ok((Config::default(), env::current_dir()?))
    }
}

fn apply_overrides(cfg: &mut Config, sets: &[String]) -> anyhow::Result<()> {
    for kv in sets {
        let mut parts = kv.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        let val = parts.next().unwrap_or("").trim();
        if key.is_empty() {
            continue;
        }
        match key {
            "highlight.style" => {
                if val.contains('"') {
                    return Err(anyhow!("highlight.style must not contain double quotes"));
                }
                cfg.highlight.style = val.to_string();
            }
            "highlight.policy" => {
                cfg.highlight.policy = if val.eq_ignore_ascii_case("split-around-tags") {
                    MarkPolicy::SplitAroundTags
                } else {
                    MarkPolicy::Enclose
                };
            }
            "highlight.mode" => {
                cfg.highlight.mode = if val.eq_ignore_ascii_case("single-pass") {
                    AnnotateMode::SinglePass
                } else {
                    AnnotateMode::Sequential
                };
            }
            "document.highlight_color" => {
                cfg.document.highlight_color = val.to_string();
            }
            "document.restore_selection" => {
                cfg.document.restore_selection = matches!(val, "true" | "1" | "yes");
            }
            "files.extensions" => {
                cfg.files.extensions = split_list(val);
            }
            "files.ignore_globs" => {
                cfg.files.ignore_globs = split_list(val);
            }
            _ => warn!(key, "unknown config override"),
        }
    }
    Ok(())
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn print_annotated(path: &Path, marks: usize, output: Option<&Path>, html: &str) {
    let badge = if marks == 0 {
        style("clean".to_string()).green()
    } else {
        style(format!("{marks} marks")).yellow()
    };
    eprintln!("{} ({})", style(path.to_string_lossy()).bold(), badge);
    match output {
        Some(out) => eprintln!("  → {}", style(out.to_string_lossy()).cyan()),
        None => println!("{html}"),
    }
}

fn print_resolve_summary(report: &ResolveReport) {
    eprintln!("{}", style(&report.path).bold());
    if report.highlighted > 0 {
        eprintln!("  highlighted {} ranges", report.highlighted);
    }
    for entry in &report.resolved {
        let status = if entry.applied.is_empty() {
            style("unchanged").dim()
        } else {
            style("replaced").green()
        };
        eprintln!(
            "  [{}] {:?} ({} applied, {} skipped)",
            status,
            entry.original,
            entry.applied.len(),
            entry.skipped.len()
        );
        if let Some(suggestion) = &entry.suggestion {
            eprintln!("      suggestion: {}", suggestion);
        }
    }
    eprintln!(
        "  size {} → {}",
        report.size_before, report.size_after
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use markmatch_core::doc::to_html;

    #[test]
    fn overrides_update_known_keys() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            &[
                "highlight.policy=split-around-tags".into(),
                "highlight.mode=single-pass".into(),
                "document.restore_selection=no".into(),
                "files.extensions=html, xhtml".into(),
                "bogus=1".into(),
            ],
        )
        .unwrap();
        assert_eq!(cfg.highlight.policy, MarkPolicy::SplitAroundTags);
        assert_eq!(cfg.highlight.mode, AnnotateMode::SinglePass);
        assert!(!cfg.document.restore_selection);
        assert_eq!(cfg.files.extensions, vec!["html", "xhtml"]);
    }

    #[test]
    fn quoted_style_override_is_rejected() {
        let mut cfg = Config::default();
        assert!(apply_overrides(&mut cfg, &["highlight.style=a\"b".into()]).is_err());
    }

    #[test]
    fn output_paths_stay_under_root() {
        let root = Path::new("/work/site");
        assert_eq!(
            relative_output(Path::new("/work/site/pages/a.html"), root),
            PathBuf::from("pages/a.html")
        );
        assert_eq!(
            relative_output(Path::new("/elsewhere/b.html"), root),
            PathBuf::from("b.html")
        );
    }

    #[test]
    fn extension_match_ignores_case() {
        let exts = vec!["html".to_string()];
        assert!(is_supported(Path::new("a/B.HTML"), &exts));
        assert!(!is_supported(Path::new("a/b.md"), &exts));
    }

    #[test]
    fn resolve_one_skips_missing_suggestion() {
        let mut editor = Editor::from_html("<p>late fee</p>");
        let finding = ComplianceResult {
            original: "late fee".into(),
            compliant: false,
            suggestion: None,
            reason: None,
            citations: Vec::new(),
        };
        let entry = resolve_one(&mut editor, &finding, true);
        assert!(entry.applied.is_empty());
        assert_eq!(to_html(editor.doc()), "<p>late fee</p>");
    }
}
