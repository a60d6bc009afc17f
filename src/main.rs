use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use diagtree::convert::{convert_with, Fragment, IdScheme};
use diagtree::export::{tree_to_dot, visualization_data, DotConfig};
use diagtree::layout::layout_with;
use diagtree::merge::{
    classify, diff, merge, DedupStrategy, DiffReport, DiffResult, LinkOutcome, MergeOutcome,
};
use diagtree::model::{check_structure, validate, Node, Tree};
use diagtree::store::{self, Format};
use diagtree::traversal::{self, Command as Input, Outcome, PromptView, Session};
use diagtree::{logging, Config, EngineError};

#[derive(Parser, Debug)]
#[command(name = "diagtree")]
#[command(author, version, about = "Troubleshooting decision trees: walk them, grow them from solved cases, lay them out")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Tree file (default: DIAGTREE_TREE_PATH, [tree] path in config, or the nearest .diagtree/tree.yaml)
    #[arg(long, global = true)]
    tree: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the tree for missing nodes and empty text
    Validate,

    /// Walk the tree interactively
    Run {
        /// Minimum similarity for a typed answer (default from config, 0.3)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Turn a diagnostic path (JSON, YAML, or an analyser response) into a fragment
    Convert {
        /// Path file
        path: PathBuf,

        /// How fragment node IDs are derived
        #[arg(long, value_enum)]
        id_scheme: Option<IdSchemeArg>,

        /// Write the fragment here (.json or .yaml) instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show what merging a path would add and change
    Diff {
        /// Path file
        path: PathBuf,

        #[arg(long, value_enum)]
        id_scheme: Option<IdSchemeArg>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge one or more paths into the tree, in order
    Merge {
        /// Path files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long, value_enum)]
        id_scheme: Option<IdSchemeArg>,

        /// How an existing link under the root is detected
        #[arg(long, value_enum)]
        dedup: Option<DedupArg>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Show the diff and stop
        #[arg(long)]
        dry_run: bool,

        /// Also write visualization JSON with new/modified nodes marked
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Add a node and link it from a decision node
    Add {
        /// Decision node that gets the new option
        parent: String,

        /// ID of the new node
        id: String,

        /// Option text leading from the parent
        #[arg(long)]
        text: String,

        /// Make the new node a question
        #[arg(long, conflicts_with = "solution", required_unless_present = "solution")]
        question: Option<String>,

        /// Make the new node a solution
        #[arg(long)]
        solution: Option<String>,
    },

    /// Rename a node, rewriting every reference to it
    Rename {
        old: String,
        new: String,
    },

    /// Remove a node and every option leading to it
    Remove {
        id: String,
    },

    /// Compute node positions and print visualization JSON
    Layout {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the tree as Graphviz DOT
    Dot {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Graph title
        #[arg(long)]
        title: Option<String>,

        /// Include node IDs in labels
        #[arg(long)]
        ids: bool,

        /// Pin nodes to computed layout positions (render with `neato -n`)
        #[arg(long)]
        positions: bool,
    },

    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum IdSchemeArg {
    Label,
    ContentHash,
}

impl From<IdSchemeArg> for IdScheme {
    fn from(arg: IdSchemeArg) -> Self {
        match arg {
            IdSchemeArg::Label => IdScheme::Label,
            IdSchemeArg::ContentHash => IdScheme::ContentHash,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DedupArg {
    ByText,
    ById,
}

impl From<DedupArg> for DedupStrategy {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::ByText => DedupStrategy::ByText,
            DedupArg::ById => DedupStrategy::ById,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load();
    let tree_path = resolve_tree_path(cli.tree, &config);

    match cli.command {
        Command::Validate => cmd_validate(&tree_path),
        Command::Run { threshold } => {
            let mut matcher = config.matcher();
            if let Some(t) = threshold {
                matcher.threshold = t;
            }
            let tree = load(&tree_path)?;
            let stdin = io::stdin();
            cmd_run(&tree, &matcher, &mut stdin.lock(), &mut io::stdout())
        }
        Command::Convert {
            path,
            id_scheme,
            output,
        } => {
            let scheme = id_scheme.map(IdScheme::from).unwrap_or(config.ingest.id_scheme);
            let fragment = fragment_from(&path, scheme)?;
            let rendered = match output.as_deref().map(Format::from_path) {
                Some(Format::Json) => serde_json::to_string_pretty(&fragment)? + "\n",
                _ => serde_yaml::to_string(&fragment)?,
            };
            write_output(output.as_deref(), &rendered)
        }
        Command::Diff {
            path,
            id_scheme,
            json,
        } => {
            let scheme = id_scheme.map(IdScheme::from).unwrap_or(config.ingest.id_scheme);
            let tree = load(&tree_path)?;
            let fragment = fragment_from(&path, scheme)?;
            let report = DiffReport::new(diff(&tree, &fragment));
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_diff(&report.details);
            }
            Ok(())
        }
        Command::Merge {
            paths,
            id_scheme,
            dedup,
            yes,
            dry_run,
            export,
        } => {
            let opts = MergeOptions {
                scheme: id_scheme.map(IdScheme::from).unwrap_or(config.ingest.id_scheme),
                strategy: dedup.map(DedupStrategy::from).unwrap_or(config.merge.dedup),
                confirm: !(yes || config.ingest.auto_confirm),
                dry_run,
                export,
            };
            cmd_merge(&tree_path, &paths, &opts, &config)
        }
        Command::Add {
            parent,
            id,
            text,
            question,
            solution,
        } => {
            let node = match (question, solution) {
                (Some(q), _) => Node::decision(q, Vec::new()),
                (None, Some(s)) => Node::solution(s),
                (None, None) => bail!("pass --question or --solution"),
            };
            edit_tree(&tree_path, |tree| tree.add_child(&parent, &text, &id, node))?;
            println!("{} {} under {}", "Added".green(), id, parent);
            Ok(())
        }
        Command::Rename { old, new } => {
            edit_tree(&tree_path, |tree| tree.rename_node(&old, &new))?;
            println!("{} {} -> {}", "Renamed".green(), old, new);
            Ok(())
        }
        Command::Remove { id } => {
            edit_tree(&tree_path, |tree| tree.remove_node(&id))?;
            println!("{} {}", "Removed".green(), id);
            Ok(())
        }
        Command::Layout { output } => {
            let tree = load(&tree_path)?;
            let positions = layout_with(&tree, &config.layout);
            let data = visualization_data(&tree, &positions, &config.layout, None);
            write_output(output.as_deref(), &(serde_json::to_string_pretty(&data)? + "\n"))
        }
        Command::Dot {
            output,
            title,
            ids,
            positions,
        } => {
            let tree = load(&tree_path)?;
            let dot_config = DotConfig {
                title,
                show_ids: ids,
                ..DotConfig::default()
            };
            let computed = positions.then(|| layout_with(&tree, &config.layout));
            let dot = tree_to_dot(
                &tree,
                &dot_config,
                None,
                computed.as_ref().map(|l| (l, &config.layout)),
            );
            write_output(output.as_deref(), &dot)
        }
        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "diagtree", &mut io::stdout());
            Ok(())
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// `--tree`, then DIAGTREE_TREE_PATH, then config, then the walk-up default
fn resolve_tree_path(flag: Option<PathBuf>, config: &Config) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    if std::env::var_os(store::TREE_PATH_ENV).is_none() {
        if let Some(path) = &config.tree.path {
            return path.clone();
        }
    }
    store::default_tree_path()
}

/// Load the tree, warning about any nodes that had to be skipped
fn load(path: &Path) -> anyhow::Result<Tree> {
    let loaded = store::load_tree(path)
        .with_context(|| format!("loading tree (set --tree or {})", store::TREE_PATH_ENV))?;
    for skipped in &loaded.malformed {
        eprintln!("{} {}", "Skipped:".yellow(), skipped);
    }
    Ok(loaded.tree)
}

fn fragment_from(path: &Path, scheme: IdScheme) -> anyhow::Result<Fragment> {
    let diagnostic = store::load_path(path).context("reading diagnostic path")?;
    Ok(convert_with(&diagnostic, scheme)?)
}

/// Load, apply one edit, save
fn edit_tree(
    tree_path: &Path,
    edit: impl FnOnce(&Tree) -> diagtree::error::Result<Tree>,
) -> anyhow::Result<()> {
    let tree = load(tree_path)?;
    let edited = edit(&tree)?;
    store::save_tree(&edited, tree_path).context("saving edited tree")?;
    Ok(())
}

fn write_output(output: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, contents)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} {}", "Wrote".green(), path.display());
        }
        None => print!("{}", contents),
    }
    Ok(())
}

fn print_diff(result: &DiffResult) {
    println!("{}", "Diff summary".bold());
    println!("  {} {}", "+ New:".green(), result.added.len());
    println!("  {} {}", "~ Modified:".yellow(), result.modified.len());
    println!("  {} {}", "- Not in path:".bright_black(), result.deleted.len());
    for id in &result.added {
        println!("    {} {}", "+".green(), id);
    }
    for id in &result.modified {
        println!("    {} {}", "~".yellow(), id);
    }
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_validate(tree_path: &Path) -> anyhow::Result<()> {
    let loaded = store::load_tree(tree_path).context("loading tree")?;
    let problems = validate(&loaded.tree);

    for skipped in &loaded.malformed {
        println!("  {} {}", "✗".red(), skipped);
    }
    for problem in &problems {
        println!("  {} {}", "✗".red(), problem);
    }

    for warning in check_structure(&loaded.tree.nodes) {
        println!("  {} {}", "!".yellow(), warning);
    }

    let total = problems.len() + loaded.malformed.len();
    if total > 0 {
        bail!("{} problem(s) in {}", total, tree_path.display());
    }
    println!(
        "{} {} ({} nodes)",
        "✓ Valid:".green(),
        tree_path.display(),
        loaded.tree.len()
    );
    Ok(())
}

fn show_prompt(tree: &Tree, session: &Session, out: &mut impl Write) -> anyhow::Result<bool> {
    match traversal::current_prompt(tree, &session.current_node)? {
        PromptView::Question { text, options } => {
            writeln!(out, "\n{}", text.bold())?;
            for (i, option) in options.iter().enumerate() {
                writeln!(out, "  {}. {}", i + 1, option.text)?;
            }
            write!(out, "> ")?;
            out.flush()?;
            Ok(false)
        }
        PromptView::Solution { text } => {
            writeln!(out, "\n{} {}", "Solution:".green().bold(), text)?;
            show_path(session, out)?;
            Ok(true)
        }
    }
}

fn show_path(session: &Session, out: &mut impl Write) -> anyhow::Result<()> {
    if session.path.is_empty() {
        writeln!(out, "{}", "(no steps taken yet)".bright_black())?;
        return Ok(());
    }
    writeln!(out, "{}", "Path:".bold())?;
    for (i, entry) in session.path.iter().enumerate() {
        writeln!(
            out,
            "  {}. {} --[{}]--> {}",
            i + 1,
            entry.from_node,
            entry.chosen_option_text,
            entry.to_node
        )?;
    }
    Ok(())
}

/// Interactive loop: prompt, read a line, apply it, repeat until quit or EOF
fn cmd_run(
    tree: &Tree,
    matcher: &diagtree::Matcher,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    writeln!(
        out,
        "{}",
        "Answer with a number or words. Commands: back, restart, path, quit".bright_black()
    )?;

    let mut session = Session::start(tree);
    let mut finished = show_prompt(tree, &session, out)?;

    let mut line = String::new();
    loop {
        if finished {
            write!(out, "{}", "(restart or quit) > ".bright_black())?;
            out.flush()?;
        }
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }

        let command = Input::parse(&line);
        if command == Input::Answer(String::new()) {
            continue;
        }
        match traversal::update(tree, matcher, command, &session) {
            Ok((_, Outcome::Quit)) => break,
            Ok((next, Outcome::ShowPath)) => {
                show_path(&next, out)?;
                session = next;
                if !finished {
                    finished = show_prompt(tree, &session, out)?;
                }
            }
            Ok((next, outcome)) => {
                if let Outcome::Moved { score, .. } = &outcome {
                    tracing::debug!(score, "answer matched");
                }
                session = next;
                finished = show_prompt(tree, &session, out)?;
            }
            Err(e) if e.is_retryable() => {
                writeln!(out, "{} {}", "?".yellow(), e)?;
                if !finished {
                    finished = show_prompt(tree, &session, out)?;
                }
            }
            Err(e @ EngineError::MalformedNode { .. }) if finished => {
                tracing::debug!("{}", e);
                writeln!(out, "{}", "Diagnosis complete. Type restart or quit.".yellow())?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

struct MergeOptions {
    scheme: IdScheme,
    strategy: DedupStrategy,
    confirm: bool,
    dry_run: bool,
    export: Option<PathBuf>,
}

/// Merge `path_files` in order, reporting each, then save once
///
/// A file that cannot be read, converted or merged is reported and skipped;
/// the rest still land. Any failure makes the command exit non-zero.
fn cmd_merge(
    tree_path: &Path,
    path_files: &[PathBuf],
    opts: &MergeOptions,
    config: &Config,
) -> anyhow::Result<()> {
    // A missing tree file starts a new tree rooted at the first fragment
    let mut tree = if tree_path.exists() {
        Some(load(tree_path)?)
    } else {
        println!("   {} {}", "Creating".green(), tree_path.display());
        None
    };

    let total = path_files.len();
    let mut changes = DiffResult::default();
    let mut merged = 0;
    let mut failed = 0;

    for (i, path_file) in path_files.iter().enumerate() {
        println!("\n{} {}", format!("[{}/{}]", i + 1, total).bold(), path_file.display());
        match merge_one(tree.as_ref(), path_file, opts) {
            Ok((outcome, diff)) => {
                changes.added.extend(diff.added);
                changes.modified.extend(diff.modified);
                tree = Some(outcome.tree);
                merged += 1;
            }
            Err(e) => {
                println!("  {} {:#}", "Failed:".red(), e);
                failed += 1;
            }
        }
    }

    println!(
        "\n{} {} merged, {} failed",
        "Summary:".bold(),
        merged,
        failed
    );

    let tree = match tree {
        Some(tree) if merged > 0 => tree,
        _ => bail!("no path could be merged"),
    };

    if opts.dry_run {
        println!("\n{}", "Dry run: tree not written".bright_black());
    } else if opts.confirm && !confirm(&format!("Merge into {}?", tree_path.display()))? {
        println!("{}", "Merge cancelled".yellow());
    } else {
        save_merged(tree_path, &tree, &changes, opts, config)?;
    }

    if failed > 0 {
        bail!("{} of {} path(s) could not be merged", failed, total);
    }
    Ok(())
}

fn save_merged(
    tree_path: &Path,
    tree: &Tree,
    changes: &DiffResult,
    opts: &MergeOptions,
    config: &Config,
) -> anyhow::Result<()> {
    store::save_tree(tree, tree_path).context("saving merged tree")?;

    if let Some(export_path) = &opts.export {
        let statuses = classify(tree, changes);
        let positions = layout_with(tree, &config.layout);
        let data = visualization_data(tree, &positions, &config.layout, Some(&statuses));
        write_output(
            Some(export_path),
            &(serde_json::to_string_pretty(&data)? + "\n"),
        )?;
    }

    println!(
        "\n{} {} ({} nodes)",
        "Merged into".green().bold(),
        tree_path.display(),
        tree.len()
    );
    Ok(())
}

/// Convert one path file and merge it into `tree` (or start a tree from it)
fn merge_one(
    tree: Option<&Tree>,
    path_file: &Path,
    opts: &MergeOptions,
) -> anyhow::Result<(MergeOutcome, DiffResult)> {
    let mut fragment = fragment_from(path_file, opts.scheme)?;
    let empty;
    let tree = match tree {
        Some(tree) => tree,
        None => {
            fragment.root_node = Some(fragment.entry_node.clone());
            empty = Tree::new(fragment.entry_node.clone());
            &empty
        }
    };

    let changes = diff(tree, &fragment);
    print_diff(&changes);

    let outcome = merge(tree, &fragment, opts.strategy)?;
    match &outcome.link {
        LinkOutcome::Linked { text, entry_node } => {
            println!("  {} \"{}\" -> {}", "Linked".green(), text, entry_node)
        }
        LinkOutcome::Duplicate { text, .. } => {
            println!("  {} root already has \"{}\"", "Skipped link:".yellow(), text)
        }
        LinkOutcome::RootReplaced { root } => println!("  {} {}", "Root:".green(), root),
    }
    for id in &outcome.overwritten {
        println!("  {} {}", "Overwrote".yellow(), id);
    }
    Ok((outcome, changes))
}

/// Ask a yes/no question on stdin; anything but y/yes is a no
fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
