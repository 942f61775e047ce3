//! FlowSentry command-line interface.
//!
//! This binary drives the `flowsentry-core` pipeline: it assembles a run
//! configuration from flags (or an interactive prompt on a bare
//! invocation), spawns the worker pool, analyses a capture CSV in batch
//! mode or follows a capture directory in live mode, prints a plain-text
//! summary and writes the results and blocklist CSVs.
//!
//! Errors are reported to stderr; exit code 1 indicates a configuration or
//! runtime failure.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;

use flowsentry_core::coordinator::{CancelToken, WorkerPool, run_batch, run_batch_resident};
use flowsentry_core::mitigation::{MitigationEngine, has_privileges};
use flowsentry_core::report::{self, BLOCKLIST_FILE, RESULTS_FILE};
use flowsentry_core::watch::LiveWatcher;
use flowsentry_core::{DetectorSet, Mode, RunConfig, RunMetrics, SuspectList};

#[derive(Parser, Debug)]
#[command(name = "flowsentry")]
#[command(
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (commit ",
        env!("FLOWSENTRY_BUILD_COMMIT"),
        ", built ",
        env!("FLOWSENTRY_BUILD_DATE"),
        ")"
    )
)]
#[command(
    about = "Windowed statistical DDoS detection over network-flow captures.",
    long_about = None,
    after_help = "Examples:\n  \
        flowsentry --mode dataset --input flows.csv\n  \
        flowsentry --mode custom --input capture.csv --detectors entropy,cusum\n  \
        flowsentry --mode live --capture-dir ./live_captures --interface eth0"
)]
struct Cli {
    /// Operating mode: dataset, custom or live
    #[arg(long, default_value = "dataset")]
    mode: String,

    /// Input CSV file (required for dataset/custom mode)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory watched for capture files in live mode
    #[arg(long, default_value = "./live_captures")]
    capture_dir: PathBuf,

    /// Network interface the rate-limit filters attach to
    #[arg(long, default_value = "eth0")]
    interface: String,

    /// Flows per analysis window
    #[arg(long, default_value_t = flowsentry_core::DEFAULT_WINDOW_SIZE)]
    window_size: usize,

    /// Comma-separated subset of entropy,pca,cusum
    #[arg(long, default_value = "entropy,pca,cusum")]
    detectors: String,

    /// Entropy-deficit alarm threshold
    #[arg(long, default_value_t = flowsentry_core::DEFAULT_ENTROPY_THRESHOLD)]
    entropy_threshold: f64,

    /// Standardised-deviation alarm threshold
    #[arg(long, default_value_t = flowsentry_core::DEFAULT_PCA_THRESHOLD)]
    pca_threshold: f64,

    /// CUSUM alarm threshold
    #[arg(long, default_value_t = flowsentry_core::DEFAULT_CUSUM_THRESHOLD)]
    cusum_threshold: f64,

    /// Apply drop rules and rate limits to confirmed suspects (needs root)
    #[arg(long)]
    enable_mitigation: bool,

    /// Directory for the results and blocklist CSVs
    #[arg(long, default_value = "./results")]
    output_dir: PathBuf,

    /// Minimum windows-of-detection before an address is blocklisted
    #[arg(long, default_value_t = flowsentry_core::DEFAULT_MIN_ADDR_COUNT)]
    min_ip_count: u32,

    /// Rate limit spec as RATE or RATE:BURST (e.g. 10mbit:100k)
    #[arg(long, default_value = "10mbit:100k")]
    rate_limit: String,

    /// Worker threads (default: available CPUs minus one)
    #[arg(long)]
    workers: Option<usize>,

    /// Chatty progress output
    #[arg(long)]
    verbose: bool,

    /// Prompt for the configuration instead of reading flags
    #[arg(long)]
    interactive: bool,
}

fn main() -> ExitCode {
    let bare_invocation = std::env::args().len() <= 1;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "info" } else { "warn" },
    ))
    .init();

    let result = if bare_invocation || cli.interactive {
        interactive_config().and_then(|config| run(config, cli.workers))
    } else {
        build_config(&cli).and_then(|config| run(config, cli.workers))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn build_config(cli: &Cli) -> Result<RunConfig> {
    let (rate_limit, rate_burst) = parse_rate_limit(&cli.rate_limit)?;
    let mode = Mode::parse(&cli.mode)?;
    let input_path = match mode {
        // Live mode reads successive capture files out of the watched
        // directory instead of one fixed input.
        Mode::Live => Some(cli.capture_dir.clone()),
        _ => cli.input.clone(),
    };
    let config = RunConfig {
        mode,
        input_path,
        output_dir: cli.output_dir.clone(),
        interface: cli.interface.clone(),
        window_size: cli.window_size,
        detectors: DetectorSet::parse(&cli.detectors),
        entropy_threshold: cli.entropy_threshold,
        pca_threshold: cli.pca_threshold,
        cusum_threshold: cli.cusum_threshold,
        enable_mitigation: cli.enable_mitigation,
        min_addr_count: cli.min_ip_count,
        rate_limit,
        rate_burst,
        verbose: cli.verbose,
        ..RunConfig::default()
    };
    config.validate()?;
    Ok(config)
}

fn parse_rate_limit(spec: &str) -> Result<(String, String)> {
    let (rate, burst) = match spec.split_once(':') {
        Some((rate, burst)) => (rate.trim(), burst.trim()),
        None => (spec.trim(), "100k"),
    };
    if rate.is_empty() || burst.is_empty() {
        bail!("invalid rate limit spec '{spec}' (expected RATE or RATE:BURST)");
    }
    Ok((rate.to_string(), burst.to_string()))
}

fn run(mut config: RunConfig, workers: Option<usize>) -> Result<()> {
    if config.enable_mitigation && !has_privileges() {
        log::warn!("mitigation requires root privileges; continuing in detection-only mode");
        config.enable_mitigation = false;
    }

    let workers = workers.unwrap_or_else(|| num_cpus::get().saturating_sub(1).max(1));
    let pool = WorkerPool::spawn(&config, workers);
    println!(
        "flowsentry: {} detector(s), {} worker(s), window size {}",
        config.detectors, workers, config.window_size
    );

    match config.mode {
        Mode::Dataset | Mode::Custom => run_dataset(&config, pool),
        Mode::Live => run_live(&config, pool),
    }
}

fn run_dataset(config: &RunConfig, pool: WorkerPool) -> Result<()> {
    let input = config
        .input_path
        .clone()
        .context("dataset mode needs an input path")?;
    println!("analysing {} ...", input.display());

    let outcome = run_batch(config, &pool, &input)
        .with_context(|| format!("analysis of {} failed", input.display()))?;
    pool.shutdown();

    finish_batch(config, &outcome, &mut mitigation_engine(config))?;
    Ok(())
}

fn run_live(config: &RunConfig, pool: WorkerPool) -> Result<()> {
    let capture_dir = config
        .input_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("./live_captures"));
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install the interrupt handler")?;

    println!("watching {} (Ctrl-C to stop)", capture_dir.display());
    let mut watcher = LiveWatcher::new(&capture_dir);
    let mut engine = mitigation_engine(config);
    let mut batches = 0u64;

    while let Some(capture) = watcher.next_capture(&cancel) {
        batches += 1;
        println!("\n[batch {batches}] analysing {} ...", capture.display());
        match run_batch_resident(config, &pool, &capture) {
            Ok(outcome) => finish_batch(config, &outcome, &mut engine)?,
            // A capture mid-rotation can vanish or truncate; wait for the
            // next one instead of tearing the run down.
            Err(err) => log::warn!("skipping capture {}: {err}", capture.display()),
        }
    }

    println!("\nstopping; analysed {batches} capture batch(es)");
    pool.shutdown();
    Ok(())
}

fn mitigation_engine(config: &RunConfig) -> Option<MitigationEngine> {
    config.enable_mitigation.then(|| {
        MitigationEngine::new(&config.interface, &config.rate_limit, &config.rate_burst)
    })
}

fn finish_batch(
    config: &RunConfig,
    outcome: &flowsentry_core::coordinator::BatchOutcome,
    engine: &mut Option<MitigationEngine>,
) -> Result<()> {
    print_summary(&outcome.metrics, &outcome.suspects, config.min_addr_count);

    let results_path = config.output_dir.join(RESULTS_FILE);
    report::write_results(&results_path, &outcome.results, &outcome.metrics)
        .with_context(|| format!("failed to write {}", results_path.display()))?;
    println!("results written -> {}", results_path.display());

    let blocklist_path = config.output_dir.join(BLOCKLIST_FILE);
    let written = report::write_blocklist(
        &blocklist_path,
        &outcome.suspects,
        config.min_addr_count,
        "combined",
    )
    .with_context(|| format!("failed to write {}", blocklist_path.display()))?;
    println!("blocklist written -> {} ({written} address(es))", blocklist_path.display());

    if let Some(engine) = engine.as_mut() {
        let processed = engine.apply(&outcome.suspects, config.min_addr_count);
        println!("mitigation applied to {processed} address(es)");
    }
    Ok(())
}

fn print_summary(metrics: &RunMetrics, suspects: &SuspectList, min_count: u32) {
    println!("\n=== Detection Analysis ===");
    println!("  Total windows analysed:       {}", metrics.total_windows);
    println!("  Windows flagged as attack:    {}", metrics.attack_windows);
    println!("  Windows flagged as benign:    {}", metrics.benign_windows);
    println!("  Actual attack windows:        {}", metrics.truth_windows);

    let combined = &metrics.combined;
    println!("\n=== Detection Accuracy ===");
    println!("  True positives:               {}", combined.true_positives);
    println!("  True negatives:               {}", combined.true_negatives);
    println!("  False positives:              {}", combined.false_positives);
    println!("  False negatives:              {}", combined.false_negatives);
    println!("  Detection rate:               {:.4}", combined.detection_rate());
    println!("  False alarm rate:             {:.4}", combined.false_alarm_rate());
    println!("  Accuracy:                     {:.4}", combined.accuracy());
    println!("  Balanced accuracy:            {:.4}", combined.balanced_accuracy());
    println!("  F1 score:                     {:.4}", combined.f1_score());

    println!("\n=== Latency ===");
    println!("  Window processing min/avg/max: {:.3} / {:.3} / {:.3} ms",
        metrics.min_latency_ms, metrics.avg_latency_ms, metrics.max_latency_ms);
    println!("  95th percentile:              {:.3} ms", metrics.p95_latency_ms);
    if metrics.detection_lead_time_ms > 0.0 {
        println!("  Detection lead time:          {:.2} ms", metrics.detection_lead_time_ms);
    }

    println!("\n=== Throughput (estimated) ===");
    println!("  Flows analysed:               {}", metrics.total_flows);
    println!("  Flow throughput:              {:.2} flows/s", metrics.flows_per_sec);
    println!("  Packet throughput:            {:.2} packets/s", metrics.packets_per_sec);
    println!("  Bandwidth:                    {:.2} Mb/s ({:.4} Gb/s)",
        metrics.bandwidth_mbps, metrics.bandwidth_gbps);
    println!("  Estimated memory:             {:.2} MB",
        metrics.estimated_memory_bytes as f64 / (1024.0 * 1024.0));

    println!("\n=== Per-detector detection rate ===");
    println!("  Entropy:                      {:.4}", metrics.entropy.detection_rate());
    println!("  Deviation:                    {:.4}", metrics.pca.detection_rate());
    println!("  CUSUM:                        {:.4}", metrics.cusum.detection_rate());

    let flagged: Vec<_> = suspects.filtered(min_count).collect();
    if !flagged.is_empty() {
        println!("\n=== Suspicious addresses (>= {min_count} windows) ===");
        for entry in flagged {
            println!("  {}: {} window(s)", entry.addr, entry.count);
        }
    }
}

/// Prompted configuration for a bare invocation. Empty answers keep the
/// defaults; EOF falls through to the defaults as well.
fn interactive_config() -> Result<RunConfig> {
    println!("=== FlowSentry configuration ===");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut ask = |label: &str, default: &str| -> String {
        print!("{label} [{default}]: ");
        let _ = io::stdout().flush();
        match lines.next() {
            Some(Ok(line)) if !line.trim().is_empty() => line.trim().to_string(),
            _ => default.to_string(),
        }
    };

    let mode = Mode::parse(&ask("Mode (dataset/custom/live)", "dataset"))?;
    let mut config = RunConfig {
        mode,
        ..RunConfig::default()
    };
    if !matches!(mode, Mode::Live) {
        let input = ask("Input CSV path", "");
        if !input.is_empty() {
            config.input_path = Some(PathBuf::from(input));
        }
    }
    config.window_size = ask(
        "Window size (flows)",
        &flowsentry_core::DEFAULT_WINDOW_SIZE.to_string(),
    )
    .parse()
    .unwrap_or(flowsentry_core::DEFAULT_WINDOW_SIZE);
    config.entropy_threshold = parse_or(
        &ask("Entropy threshold", "0.20"),
        flowsentry_core::DEFAULT_ENTROPY_THRESHOLD,
    );
    config.pca_threshold = parse_or(
        &ask("Deviation threshold", "2.5"),
        flowsentry_core::DEFAULT_PCA_THRESHOLD,
    );
    config.cusum_threshold = parse_or(
        &ask("CUSUM threshold", "3.0"),
        flowsentry_core::DEFAULT_CUSUM_THRESHOLD,
    );
    config.output_dir = PathBuf::from(ask("Output directory", "./results"));
    config.enable_mitigation = ask("Enable mitigation? (y/N)", "n")
        .to_ascii_lowercase()
        .starts_with('y');

    config.validate()?;
    Ok(config)
}

fn parse_or(text: &str, default: f64) -> f64 {
    text.parse().unwrap_or(default)
}
