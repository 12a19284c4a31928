use std::fmt::{self, Write as _};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cmj_force_analyzer::batch_analysis::{self, metrics_path_for};
use cmj_force_analyzer::metrics_export::{metric_rows, write_metric_rows, write_metrics_csv, write_trace};
use cmj_force_analyzer::phase_segmenter::{BoundaryKind, BoundarySource};
use cmj_force_analyzer::pre_post_comparison::{write_comparison, ComparisonRow, ComparisonSession};
use cmj_force_analyzer::{
    AnalysisConfig, AnalysisSession, FlightSelection, NearestSample, OverrideTarget, SegmentationPolicy,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Countermovement jump force-plate analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one dual-plate recording and export its metrics table
    Analyze(AnalyzeArgs),
    /// Compare a Pre and a Post metrics table
    Compare(CompareArgs),
    /// Analyse every recording below a folder
    Batch(BatchArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyOpt {
    BaselineThreshold,
    FlightAnchored,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SelectionOpt {
    First,
    GlobalMinimum,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Subject mass in kg
    #[arg(long)]
    mass: Option<f64>,

    /// Resting force (≈ body weight) for onset detection, N
    #[arg(long)]
    baseline: Option<f64>,

    /// JSON configuration file
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Parameter override, e.g. `--param offset_left=41` (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Segmentation policy
    #[arg(long, value_enum)]
    policy: Option<PolicyOpt>,

    /// Which flight interval counts as the jump
    #[arg(long, value_enum)]
    flight_selection: Option<SelectionOpt>,

    /// Start from the original desktop tool's settings
    #[arg(long, action = ArgAction::SetTrue)]
    legacy_defaults: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Recording (time_ms,left,right per line)
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Manually placed eccentric onset (seconds)
    #[arg(long)]
    override_eccentric: Option<f64>,

    /// Manually placed concentric onset (seconds)
    #[arg(long)]
    override_concentric: Option<f64>,

    /// Metrics CSV path (`-` for stdout, defaults next to the input)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Per-sample trace CSV for plotting
    #[arg(long, value_hint = ValueHint::FilePath)]
    trace: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    pre: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    post: PathBuf,

    /// Comparison CSV path (`-` for stdout)
    #[arg(short, long, default_value = "comparison.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[arg(value_hint = ValueHint::DirPath)]
    folder: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Analyze(args) => args.config.verbose,
        Command::Compare(args) => args.verbose,
        Command::Batch(args) => args.config.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Compare(args) => handle_compare(args),
        Command::Batch(args) => handle_batch(args),
    }
}

fn build_config(args: &ConfigArgs) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None if args.legacy_defaults => AnalysisConfig::legacy_desktop(),
        None => AnalysisConfig::default(),
    };

    for assignment in &args.params {
        config.apply_assignment(assignment)?;
    }
    if let Some(mass) = args.mass {
        config.subject_mass = Some(mass);
    }
    if let Some(baseline) = args.baseline {
        config.baseline_force = Some(baseline);
    }
    if let Some(policy) = args.policy {
        config.segmentation_policy = match policy {
            PolicyOpt::BaselineThreshold => SegmentationPolicy::BaselineThreshold,
            PolicyOpt::FlightAnchored => SegmentationPolicy::FlightAnchored,
        };
    }
    if let Some(selection) = args.flight_selection {
        config.flight_selection = match selection {
            SelectionOpt::First => FlightSelection::First,
            SelectionOpt::GlobalMinimum => FlightSelection::GlobalMinimum,
        };
    }

    config.validate()?;
    Ok(config)
}

/// `-` routes the CSV to stdout; the human-readable report then goes to stderr.
fn writes_to_stdout(path: &Path) -> bool {
    path == Path::new("-")
}

fn emit_report(report: &str, csv_on_stdout: bool) {
    if csv_on_stdout {
        eprint!("{}", report);
    } else {
        print!("{}", report);
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = build_config(&args.config)?;
    info!("analysing {}", args.input.display());

    let output = args.output.clone().unwrap_or_else(|| metrics_path_for(&args.input));
    let csv_on_stdout = writes_to_stdout(&output);

    let mut session = AnalysisSession::run_file(config, &args.input)
        .with_context(|| format!("failed to analyse {}", args.input.display()))?;

    let mut report = String::new();
    let time_s = session.time_s().to_vec();
    let resolver = NearestSample::new(&time_s);
    if let Some(t) = args.override_eccentric {
        let index = session.override_boundary(OverrideTarget::OnsetEccentric, t, &resolver)?;
        writeln!(report, "✋ Eccentric onset set manually at sample {} ({:.3}s)", index, time_s[index])?;
    }
    if let Some(t) = args.override_concentric {
        let index = session.override_boundary(OverrideTarget::OnsetConcentric, t, &resolver)?;
        writeln!(report, "✋ Concentric onset set manually at sample {} ({:.3}s)", index, time_s[index])?;
    }

    report.push_str(&session_summary(&session)?);
    emit_report(&report, csv_on_stdout);

    let metrics = session.metrics();
    if csv_on_stdout {
        write_metric_rows(&metric_rows(&metrics), io::stdout().lock())?;
    } else {
        write_metrics_csv(&metrics, &output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!("📁 Metrics saved to: {}", output.display());
    }

    if let Some(trace_path) = args.trace {
        let file = File::create(&trace_path)
            .with_context(|| format!("failed to create {}", trace_path.display()))?;
        write_trace(&metrics, session.force_filt(), session.flights(), file)?;
        emit_report(&format!("📈 Trace saved to: {}\n", trace_path.display()), csv_on_stdout);
    }

    Ok(())
}

fn session_summary(session: &AnalysisSession) -> Result<String, fmt::Error> {
    let config = session.config();
    let boundaries = session.boundaries();
    let mut out = String::new();

    writeln!(out, "\n🦘 CMJ ANALYSIS")?;
    writeln!(out, "==============")?;
    writeln!(out, "Samples: {}", session.samples().len())?;
    writeln!(
        out,
        "Policy: {:?}, flight selection: {:?}",
        config.segmentation_policy, config.flight_selection
    )?;
    writeln!(
        out,
        "Flight intervals (≥ {:.3}s below {:.1}N): {}",
        config.min_flight_duration,
        config.flight_threshold,
        session.flights().len()
    )?;

    writeln!(out, "\n📍 Phase boundaries:")?;
    for kind in [
        BoundaryKind::OnsetEccentric,
        BoundaryKind::OnsetConcentric,
        BoundaryKind::Takeoff,
        BoundaryKind::Landing,
    ] {
        let b = boundaries.get(kind);
        let marker = match b.source {
            BoundarySource::Detected => "",
            BoundarySource::Fallback => "  ⚠️  not detected",
            BoundarySource::Manual => "  ✋ manual",
        };
        let time = session.time_s().get(b.index).copied().unwrap_or(f64::NAN);
        writeln!(out, "  {:<18} sample {:>6}  ({:.3}s){}", kind.to_string(), b.index, time, marker)?;
    }
    for (a, b) in boundaries.ordering_violations() {
        writeln!(out, "  ⚠️  {} is after {}", a, b)?;
    }

    writeln!(out, "\n📊 CMJ METRICS")?;
    writeln!(out, "==============")?;
    for row in metric_rows(&session.metrics()) {
        writeln!(out, "  {:<32} {}", row.label, row.value)?;
    }
    Ok(out)
}

fn handle_compare(args: CompareArgs) -> Result<()> {
    let csv_on_stdout = writes_to_stdout(&args.output);
    let mut comparison = ComparisonSession::new();
    comparison
        .load_pre(&args.pre)
        .with_context(|| format!("failed to read Pre table {}", args.pre.display()))?;
    comparison
        .load_post(&args.post)
        .with_context(|| format!("failed to read Post table {}", args.post.display()))?;

    let rows = comparison
        .rows()
        .ok_or_else(|| anyhow!("both Pre and Post tables are required"))?;
    emit_report(&comparison_summary(&rows)?, csv_on_stdout);

    if csv_on_stdout {
        write_comparison(&rows, io::stdout().lock())?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        write_comparison(&rows, file)?;
        println!("📁 Comparison saved to: {}", args.output.display());
    }
    Ok(())
}

fn comparison_summary(rows: &[ComparisonRow]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    if rows.is_empty() {
        writeln!(out, "⚠️  No comparable parameters found in both tables")?;
    }
    writeln!(out, "\n📊 PRE vs POST")?;
    writeln!(out, "==============")?;

    let fmt_value = |v: Option<f64>| v.map(|x| format!("{:.2}", x)).unwrap_or_else(|| "—".to_string());
    let mut current_group = None;
    for row in rows {
        if current_group != Some(row.group) {
            writeln!(out, "\n{}:", row.group.title())?;
            current_group = Some(row.group);
        }
        let arrow = match row.diff_percent {
            Some(d) if d > 0.0 => "📈",
            Some(d) if d < 0.0 => "📉",
            _ => "  ",
        };
        writeln!(
            out,
            "  {:<32} {:>10} → {:>10}  {} {}",
            row.label,
            fmt_value(row.pre_value),
            fmt_value(row.post_value),
            arrow,
            row.diff_percent.map(|d| format!("{:+.2}%", d)).unwrap_or_else(|| "—".to_string())
        )?;
    }
    Ok(out)
}

fn handle_batch(args: BatchArgs) -> Result<()> {
    let config = build_config(&args.config)?;
    let start = std::time::Instant::now();

    println!("\n🦘 CMJ BATCH ANALYSIS");
    println!("=====================");
    let report = batch_analysis::run_batch(&args.folder, &config)
        .with_context(|| format!("batch analysis of {} failed", args.folder.display()))?;

    println!(
        "\n✅ Processed {} recordings in {:.2}s ({} failed)",
        report.rows.len(),
        start.elapsed().as_secs_f64(),
        report.failures.len()
    );
    for (path, reason) in &report.failures {
        println!("  ⚠️  {}: {}", path.display(), reason);
    }
    println!("📁 Summary saved to: {}", report.summary_path.display());
    Ok(())
}
