//! MTF-Scan — multi-timeframe TA scanner
//!
//! Usage:
//!   mtf-scan scan --mode pivot --symbols BTCUSDT,ETHUSDT
//!   mtf-scan watch --mode bollinger --interval-secs 300
//!   mtf-scan momentum --top-n 20
//!   mtf-scan screen --reference 4h --notify

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use engine::scanner::{self, ScanProgress, ScanStatus};
use engine::universe::{apply_suffix, load_symbols};
use engine::{
    BlendMode, CachedProvider, Embed, IntervalWeights, MarketDataProvider, MomentumBoard,
    MomentumRequest, ScanOutcome, ScanRequest, ScreenRequest, SymbolScore, Timeframe,
    TradingViewClient, WebhookNotifier,
};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const WEBHOOK_URL_VAR: &str = "MTF_SCAN_WEBHOOK_URL";
const DEFAULT_SYMBOLS_FILE: &str = "config/symbols.txt";

#[derive(Parser)]
#[command(name = "mtf-scan")]
#[command(about = "Multi-timeframe technical-analysis scanner", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct FetchOpts {
    /// Symbols to scan (comma-separated); falls back to the symbols file
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,

    /// Symbols file, one ticker per line
    #[arg(long, default_value = DEFAULT_SYMBOLS_FILE)]
    symbols_file: PathBuf,

    /// Suffix appended to every symbol (e.g. .P for perpetuals)
    #[arg(long, default_value = "")]
    suffix: String,

    /// Exchange routed through the provider
    #[arg(long, default_value = "BYBIT")]
    exchange: String,

    /// Provider screener
    #[arg(long, default_value = "crypto")]
    screener: String,

    /// Serve repeated fetches from an in-memory cache for this many seconds
    #[arg(long)]
    cache_ttl_secs: Option<u64>,

    /// Optional CSV export path (full overwrite)
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one correlation-blend scan
    Scan {
        #[command(flatten)]
        fetch: FetchOpts,

        /// Blend mode: momentum, atr, pivot, bollinger, tdfi
        #[arg(long, default_value = "momentum", value_parser = parse_mode)]
        mode: BlendMode,

        /// Timeframes to sample (comma-separated; defaults to all)
        #[arg(long, value_delimiter = ',', value_parser = parse_timeframe)]
        timeframes: Vec<Timeframe>,

        /// Sampling rounds per cell
        #[arg(long, default_value_t = 3)]
        rounds: u32,

        /// Number of ranked results to keep
        #[arg(long, default_value_t = 20)]
        top_n: usize,
    },
    /// Repeat scans on an interval until Ctrl+C
    Watch {
        #[command(flatten)]
        fetch: FetchOpts,

        #[arg(long, default_value = "momentum", value_parser = parse_mode)]
        mode: BlendMode,

        #[arg(long, value_delimiter = ',', value_parser = parse_timeframe)]
        timeframes: Vec<Timeframe>,

        #[arg(long, default_value_t = 3)]
        rounds: u32,

        #[arg(long, default_value_t = 20)]
        top_n: usize,

        /// Seconds between scan cycles
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Static-weight momentum dashboard (top long/short lists)
    Momentum {
        #[command(flatten)]
        fetch: FetchOpts,

        /// Interval weights, e.g. "15m=0.2,1h=0.3,4h=0.3,1d=0.2"
        #[arg(long)]
        weights: Option<String>,

        #[arg(long, default_value_t = 20)]
        top_n: usize,
    },
    /// Neutral screen with optional webhook notification
    Screen {
        #[command(flatten)]
        fetch: FetchOpts,

        #[arg(long, value_delimiter = ',', value_parser = parse_timeframe)]
        timeframes: Vec<Timeframe>,

        /// Timeframe checked for the consensus rule
        #[arg(long, default_value = "1h", value_parser = parse_timeframe)]
        reference: Timeframe,

        /// Minimum individual neutral signals for consensus
        #[arg(long, default_value_t = 11)]
        min_neutral: u32,

        /// Neutral band half-width around zero
        #[arg(long, default_value_t = 0.5)]
        band: f64,

        /// Post consensus symbols to the webhook from MTF_SCAN_WEBHOOK_URL
        #[arg(long)]
        notify: bool,
    },
}

fn parse_mode(s: &str) -> Result<BlendMode, String> {
    s.parse()
}

fn parse_timeframe(s: &str) -> Result<Timeframe, String> {
    s.parse()
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,mtf_scan=debug")
    } else {
        EnvFilter::new("info,engine=info,mtf_scan=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Scan {
            fetch,
            mode,
            timeframes,
            rounds,
            top_n,
        } => cmd_scan(fetch, mode, timeframes, rounds, top_n).await?,
        Commands::Watch {
            fetch,
            mode,
            timeframes,
            rounds,
            top_n,
            interval_secs,
        } => cmd_watch(fetch, mode, timeframes, rounds, top_n, interval_secs).await?,
        Commands::Momentum {
            fetch,
            weights,
            top_n,
        } => cmd_momentum(fetch, weights, top_n).await?,
        Commands::Screen {
            fetch,
            timeframes,
            reference,
            min_neutral,
            band,
            notify,
        } => cmd_screen(fetch, timeframes, reference, min_neutral, band, notify).await?,
    }

    Ok(())
}

// ============================================================================
// Shared setup
// ============================================================================

fn resolve_symbols(fetch: &FetchOpts) -> Result<Vec<String>> {
    let symbols = if fetch.symbols.is_empty() {
        load_symbols(&fetch.symbols_file)?
    } else {
        fetch
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    };

    let symbols = apply_suffix(symbols, &fetch.suffix);
    if symbols.is_empty() {
        anyhow::bail!("no symbols to scan — pass --symbols or fill {}", fetch.symbols_file.display());
    }
    Ok(symbols)
}

fn build_provider(fetch: &FetchOpts) -> Arc<dyn MarketDataProvider> {
    let client = TradingViewClient::new(&fetch.exchange, &fetch.screener);
    match fetch.cache_ttl_secs {
        Some(secs) => Arc::new(CachedProvider::new(
            client,
            std::time::Duration::from_secs(secs),
        )),
        None => Arc::new(client),
    }
}

fn default_timeframes(timeframes: Vec<Timeframe>) -> Vec<Timeframe> {
    if timeframes.is_empty() {
        Timeframe::ALL.to_vec()
    } else {
        timeframes
    }
}

fn spawn_cancel_handler(progress: Arc<ScanProgress>) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl+C received, requesting cancel...");
        progress.cancelled.store(true, Ordering::Relaxed);
    });
}

fn export_if_requested(fetch: &FetchOpts, snapshots: &[engine::IndicatorSnapshot]) {
    if let Some(path) = &fetch.export {
        match engine::export_csv(snapshots, path) {
            Ok(()) => println!("Data exported to {}", path.display()),
            Err(e) => warn!(error = %e, "CSV export failed"),
        }
    }
}

// ============================================================================
// Scan command
// ============================================================================

async fn cmd_scan(
    fetch: FetchOpts,
    mode: BlendMode,
    timeframes: Vec<Timeframe>,
    rounds: u32,
    top_n: usize,
) -> Result<()> {
    println!("\n=== MTF-Scan v{} ===", APP_VERSION);

    let symbols = resolve_symbols(&fetch)?;
    let timeframes = default_timeframes(timeframes);
    println!(
        "Mode: {} | Symbols: {} | Timeframes: {} | Rounds: {}",
        mode,
        symbols.len(),
        timeframes
            .iter()
            .map(|tf| tf.label())
            .collect::<Vec<_>>()
            .join(","),
        rounds
    );
    println!();

    let provider = build_provider(&fetch);
    let progress = Arc::new(ScanProgress::new());
    progress.reset();
    spawn_cancel_handler(progress.clone());

    let request = ScanRequest {
        symbols,
        timeframes,
        mode,
        rounds,
        top_n,
    };

    let outcome = run_with_progress(request, provider, progress).await?;
    print_scan_outcome(&outcome);
    export_if_requested(&fetch, &outcome.snapshots);

    Ok(())
}

/// Spawn the scan and render progress from the shared state until done
async fn run_with_progress(
    request: ScanRequest,
    provider: Arc<dyn MarketDataProvider>,
    progress: Arc<ScanProgress>,
) -> Result<ScanOutcome> {
    let task_progress = progress.clone();
    let handle = tokio::spawn(async move {
        scanner::run_scan(&request, provider.as_ref(), &task_progress).await
    });

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;

        let status = *progress.status.read().unwrap();
        let done = progress.completed.load(Ordering::Relaxed);
        let total = progress.total_cells.load(Ordering::Relaxed);
        let failed = progress.failed.load(Ordering::Relaxed);
        let pct = progress.progress_pct();

        match status {
            ScanStatus::Fetching => {
                let bar_len = 30;
                let filled = (pct as usize * bar_len) / 100;
                let bar: String = "=".repeat(filled) + &" ".repeat(bar_len - filled);
                let current = progress.current_symbol.read().unwrap().clone();
                print!(
                    "\r  Fetching [{}] {:.0}% ({}/{}, {} failed) — {}   ",
                    bar, pct, done, total, failed, current
                );
            }
            ScanStatus::Scoring => {
                print!("\r  Scoring...                                                  ");
            }
            ScanStatus::Complete | ScanStatus::Idle => {
                println!("\r  Complete ({} cells, {} failed)                              ", done, failed);
                break;
            }
            ScanStatus::Error => {
                let msg = progress
                    .error_message
                    .read()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                println!("\r  Error: {}", msg);
                break;
            }
        }
    }

    Ok(handle.await?)
}

fn print_scores(title: &str, scores: &[SymbolScore]) {
    if scores.is_empty() {
        return;
    }
    println!("\n{title}");
    println!("{:<6} {:<16} {:>12} {:>7}", "Rank", "Symbol", "Score", "Cells");
    for (i, s) in scores.iter().enumerate() {
        println!(
            "{:<6} {:<16} {:>12.4} {:>7}",
            i + 1,
            s.symbol,
            s.score,
            s.cells
        );
    }
}

fn print_scan_outcome(outcome: &ScanOutcome) {
    print_scores(&format!("Top symbols ({} blend):", outcome.mode), &outcome.scores);

    if !outcome.matches.is_empty() {
        println!("\nSymbols inside the {} proximity band:", outcome.mode);
        println!(
            "{:<16} {:>14} {:>14} {:>9}",
            "Symbol", "Close", "Blended", "Offset%"
        );
        for m in &outcome.matches {
            println!(
                "{:<16} {:>14.6} {:>14.6} {:>9.3}",
                m.symbol, m.close, m.blended, m.offset_pct
            );
        }
    }

    if outcome.scores.is_empty() && outcome.matches.is_empty() {
        println!("\nNo data could be fetched for the provided symbols.");
    }

    if !outcome.error_symbols.is_empty() {
        println!(
            "\nCould not fetch data for: {}",
            outcome.error_symbols.join(", ")
        );
    }
}

// ============================================================================
// Watch command
// ============================================================================

async fn cmd_watch(
    fetch: FetchOpts,
    mode: BlendMode,
    timeframes: Vec<Timeframe>,
    rounds: u32,
    top_n: usize,
    interval_secs: u64,
) -> Result<()> {
    println!("\n=== MTF-Scan v{} ===", APP_VERSION);
    println!("Watch mode — interval {}s. Press Ctrl+C to stop", interval_secs);

    let symbols = resolve_symbols(&fetch)?;
    let timeframes = default_timeframes(timeframes);
    let provider = build_provider(&fetch);
    let progress = Arc::new(ScanProgress::new());
    progress.reset();
    spawn_cancel_handler(progress.clone());

    let request = ScanRequest {
        symbols,
        timeframes,
        mode,
        rounds,
        top_n,
    };

    let task_progress = progress.clone();
    let task_provider = provider.clone();
    let task_request = request.clone();
    let handle = tokio::spawn(async move {
        scanner::run_watch(
            &task_request,
            task_provider.as_ref(),
            &task_progress,
            interval_secs,
        )
        .await;
    });

    // Re-render whenever a cycle lands a fresh outcome
    let mut last_seen: Option<String> = None;
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        if progress.cancelled.load(Ordering::Relaxed) && !progress.is_running() {
            break;
        }

        let stamp = progress.started_at.read().unwrap().clone();
        let fresh = {
            let status = *progress.status.read().unwrap();
            status == ScanStatus::Complete && stamp != last_seen
        };
        if fresh {
            last_seen = stamp;
            if let Some(outcome) = progress.last_outcome.read().unwrap().as_ref() {
                print_scan_outcome(outcome);
                export_if_requested(&fetch, &outcome.snapshots);
            }
        }
    }

    handle.await?;
    println!("Watch stopped.");
    Ok(())
}

// ============================================================================
// Momentum command
// ============================================================================

async fn cmd_momentum(fetch: FetchOpts, weights: Option<String>, top_n: usize) -> Result<()> {
    println!("\n=== MTF-Scan v{} ===", APP_VERSION);

    let symbols = resolve_symbols(&fetch)?;
    let weights = match weights {
        Some(spec) => IntervalWeights::parse(&spec).map_err(|e| anyhow::anyhow!(e))?,
        None => IntervalWeights::momentum_defaults(),
    };

    let provider = build_provider(&fetch);
    let progress = Arc::new(ScanProgress::new());
    progress.reset();
    spawn_cancel_handler(progress.clone());

    let request = MomentumRequest {
        symbols,
        weights,
        top_n,
    };

    let board: MomentumBoard =
        scanner::run_momentum(&request, provider.as_ref(), &progress).await;

    print_scores("Top symbols for long position:", &board.long);
    print_scores("Top symbols for short position:", &board.short);
    println!("\nAverage momentum score: {:.2}", board.average_score);

    if !board.error_symbols.is_empty() {
        println!(
            "\nCould not fetch data for: {}",
            board.error_symbols.join(", ")
        );
    }

    export_if_requested(&fetch, &board.snapshots);
    Ok(())
}

// ============================================================================
// Screen command
// ============================================================================

async fn cmd_screen(
    fetch: FetchOpts,
    timeframes: Vec<Timeframe>,
    reference: Timeframe,
    min_neutral: u32,
    band: f64,
    notify: bool,
) -> Result<()> {
    println!("\n=== MTF-Scan v{} ===", APP_VERSION);

    let symbols = resolve_symbols(&fetch)?;
    let timeframes = default_timeframes(timeframes);
    let provider = build_provider(&fetch);
    let progress = Arc::new(ScanProgress::new());
    progress.reset();
    spawn_cancel_handler(progress.clone());

    let request = ScreenRequest {
        symbols,
        timeframes,
        weights: IntervalWeights::ladder(),
        band,
        min_neutral,
        reference,
    };

    let outcome = scanner::run_screen(&request, provider.as_ref(), &progress).await;

    if outcome.neutral.is_empty() && outcome.consensus.is_empty() {
        println!("\nCalm and patience — no candidates this run.");
    } else {
        if !outcome.neutral.is_empty() {
            println!("\nNeutral band ({:+.1}..{:+.1}):", -band, band);
            for symbol in &outcome.neutral {
                println!("  {symbol}");
            }
        }
        if !outcome.consensus.is_empty() {
            println!("\nConsensus candidates ({} ≥ {} neutral signals):", reference, min_neutral);
            for symbol in &outcome.consensus {
                println!("  {symbol}");
            }
        }
    }

    if !outcome.error_symbols.is_empty() {
        println!(
            "\nCould not fetch data for: {}",
            outcome.error_symbols.join(", ")
        );
    }

    if notify && !outcome.consensus.is_empty() {
        match std::env::var(WEBHOOK_URL_VAR) {
            Ok(url) if !url.is_empty() => {
                let embed = Embed::new(
                    &reference.label().to_uppercase(),
                    "Grid candidates:",
                )
                .with_symbols(&outcome.consensus)
                .footer("mtf-scan");
                let notifier = WebhookNotifier::new(&url);
                if let Err(e) = notifier.send(&embed).await {
                    warn!(error = %e, "Webhook notification failed");
                }
            }
            _ => warn!("--notify set but {} is not configured", WEBHOOK_URL_VAR),
        }
    }

    export_if_requested(&fetch, &outcome.snapshots);
    Ok(())
}
