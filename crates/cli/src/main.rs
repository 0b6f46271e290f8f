use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use grammars::Grammar;
use rule_trace::{
    ArchiveCompression, MatcherCategory, ParseTracer, TraceArchive, TraceFormat, TraceTable,
    TracerConfig,
};
use rule_trace_engine::TextBuffer;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

mod grammars;

#[derive(Parser)]
#[command(name = "rule-trace")]
#[command(about = "Trace rule matching runs into replayable archives", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an input file with a demo grammar and write a trace archive
    Trace(TraceArgs),

    /// Summarise an existing trace archive
    Inspect(InspectArgs),
}

#[derive(Args)]
struct TraceArgs {
    /// Grammar to run
    #[arg(short, long, value_enum)]
    grammar: Grammar,

    /// Input text file
    #[arg(short, long)]
    input: PathBuf,

    /// Archive to create (must not exist)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Trace table layout
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Store entries without compression
    #[arg(long)]
    stored: bool,

    /// TOML tracer configuration; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct InspectArgs {
    /// Archive to read
    archive: PathBuf,

    /// List every matcher
    #[arg(long)]
    matchers: bool,

    /// Output JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Nodes,
    Events,
}

impl From<FormatArg> for TraceFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Nodes => TraceFormat::Nodes,
            FormatArg::Events => TraceFormat::Events,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Trace(args) => run_trace(args).await,
        Commands::Inspect(args) => run_inspect(&args),
    }
}

fn load_config(args: &TraceArgs) -> Result<TracerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            TracerConfig::from_toml_str(&raw)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => {
            let output = args
                .output
                .clone()
                .context("--output is required without --config")?;
            TracerConfig::new(output)
        }
    };

    if let (Some(_), Some(output)) = (&args.config, &args.output) {
        config.archive_path = output.clone();
    }
    if let Some(format) = args.format {
        config.format = format.into();
    }
    if args.stored {
        config.compression = ArchiveCompression::Stored;
    }
    config
        .validate()
        .map_err(|msg| anyhow::anyhow!("Invalid configuration: {msg}"))?;
    Ok(config)
}

async fn run_trace(args: TraceArgs) -> Result<()> {
    let config = load_config(&args)?;
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input {}", args.input.display()))?;

    let tracer = ParseTracer::new(config)?;
    let grammar = args.grammar.build();
    let report = tracer
        .trace(grammar.root.clone(), TextBuffer::new(text))
        .await
        .context("Trace run failed")?;

    let status = if report.result.matched {
        "matched"
    } else {
        "no match"
    };
    println!(
        "{status}: {} of {} chars, {} nodes, {} matchers -> {}",
        report.result.end_index.min(report.result.input_length),
        report.result.input_length,
        report.summary.node_count,
        report.summary.matcher_count,
        report.archive_path.display()
    );
    Ok(())
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let archive = open_archive(&args.archive)?;

    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    for matcher in &archive.matchers {
        *categories.entry(matcher.category.to_string()).or_default() += 1;
    }
    let (successes, failures) = outcome_counts(&archive.trace);
    let format = archive.trace.format();

    if args.json {
        let mut body = json!({
            "entries": archive.entries,
            "format": format,
            "summary": archive.summary,
            "categories": categories,
            "successes": successes,
            "failures": failures,
        });
        if args.matchers {
            body["matchers"] = serde_json::to_value(&archive.matchers)?;
        }
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let summary = &archive.summary;
    println!("archive:   {}", args.archive.display());
    println!("entries:   {}", archive.entries.join(", "));
    println!("format:    {}", format.entry_name());
    println!(
        "input:     {} lines, {} code points, {} UTF-16 units",
        summary.line_count, summary.code_point_count, summary.char_count
    );
    println!(
        "trace:     {} events, {} nodes ({successes} matched, {failures} failed)",
        summary.event_count, summary.node_count
    );
    println!("matchers:  {}", summary.matcher_count);
    for category in MatcherCategory::ALL {
        let count = categories.get(category.as_str()).copied().unwrap_or(0);
        println!("  {:<10} {count}", category.as_str());
    }
    if args.matchers {
        for matcher in &archive.matchers {
            println!(
                "  #{:<4} {:<10} {:<24} {}",
                matcher.id.0,
                matcher.category.as_str(),
                matcher.class_name,
                matcher.label
            );
        }
    }
    Ok(())
}

fn open_archive(path: &Path) -> Result<TraceArchive> {
    TraceArchive::open(path).with_context(|| format!("Failed to open archive {}", path.display()))
}

fn outcome_counts(trace: &TraceTable) -> (usize, usize) {
    match trace {
        TraceTable::Nodes(rows) => {
            let ok = rows.iter().filter(|row| row.success).count();
            (ok, rows.len() - ok)
        }
        TraceTable::Events(events) => {
            let ok = events
                .iter()
                .filter(|event| event.kind == rule_trace::EventKind::Success)
                .count();
            let failed = events
                .iter()
                .filter(|event| event.kind == rule_trace::EventKind::Failure)
                .count();
            (ok, failed)
        }
    }
}
