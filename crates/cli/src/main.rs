//! CLI entry point for pdf-press
//!
//! Loads a document, requests a quality level, optionally warms every level
//! in the background, and writes the effective result.

use clap::Parser;
use pdf_press::{
    run_startup_checks, Config, GhostscriptProvider, PreloadPhase, PreviewSink, QualityLevel,
    Session, SessionError,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// pdf-press - Offloaded PDF compression with per-quality-level caching
#[derive(Parser, Debug)]
#[command(name = "pdf-press")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PDF file
    input: PathBuf,

    /// Quality level to request (original, screen, ebook, printer, prepress)
    #[arg(short, long, default_value = "ebook")]
    quality: String,

    /// Output path (defaults to <input>.<quality>.pdf)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Base directory for engine staging files (overrides config)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Image resolution override in dpi
    #[arg(long)]
    image_dpi: Option<u32>,

    /// Precompute every quality level before exiting
    #[arg(long, default_value = "false")]
    preload_all: bool,

    /// Print the per-level summary as JSON
    #[arg(long, default_value = "false")]
    json: bool,

    /// Skip startup checks (Ghostscript availability). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

/// Sink reporting notifications as log lines.
struct LogSink;

impl PreviewSink for LogSink {
    fn on_preview_ready(&self, level: QualityLevel, _payload: &Arc<Vec<u8>>, bytes: u64) {
        info!(%level, bytes, "preview ready");
    }

    fn on_preview_failed(&self, level: QualityLevel, error: &SessionError) {
        warn!(%level, %error, "preview failed");
    }

    fn on_level_unlocked(&self, level: QualityLevel, size_hint: Option<u64>) {
        info!(%level, ?size_hint, "level unlocked");
    }
}

fn load_config(args: &Args) -> Result<Config, pdf_press::config::ConfigError> {
    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    };

    if let Some(staging_dir) = &args.staging_dir {
        config.engine.staging_dir = staging_dir.clone();
    }

    Ok(config)
}

fn print_summary(session: &Session, json: bool) {
    let summary = session.summary();
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => error!(error = %e, "failed to render summary"),
        }
        return;
    }

    println!("{:<10} {:<10} {:>12}", "level", "status", "bytes");
    for row in summary {
        let bytes = row
            .bytes
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = match row.status {
            pdf_press::LevelStatus::Cached => "cached",
            pdf_press::LevelStatus::Pending => "pending",
            pdf_press::LevelStatus::Failed => "failed",
            pdf_press::LevelStatus::OnDemand => "on-demand",
        };
        println!("{:<10} {:<10} {:>12}", row.level, status, bytes);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let quality: QualityLevel = match args.quality.parse() {
        Ok(quality) => quality,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.skip_checks {
        warn!("Skipping startup checks (--skip-checks enabled)");
    } else if let Err(e) = run_startup_checks(&config) {
        error!("Startup check failed: {}", e);
        return ExitCode::FAILURE;
    }

    let bytes = match std::fs::read(&args.input) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read {}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let provider = Arc::new(GhostscriptProvider::from_config(&config.engine));
    let session = Arc::new(
        Session::new(&config, provider, Arc::new(LogSink)).with_image_dpi(args.image_dpi),
    );

    session.load_document(bytes);

    let payload = match session.set_quality(quality).await {
        Ok(payload) => payload,
        Err(e) => {
            error!(%quality, "Compression failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let out_path = args.out.clone().unwrap_or_else(|| {
        let stem = args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());
        args.input.with_file_name(format!("{}.{}.pdf", stem, quality))
    });

    if let Err(e) = std::fs::write(&out_path, payload.as_ref()) {
        error!("Failed to write {}: {}", out_path.display(), e);
        return ExitCode::FAILURE;
    }
    info!(
        out = %out_path.display(),
        bytes = payload.len(),
        "wrote compressed document"
    );

    if args.preload_all {
        Arc::clone(&session).start_preload();
        while session.preload_phase() == PreloadPhase::Running {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    print_summary(&session, args.json);

    let stats = session.queue_stats();
    info!(
        submitted = stats.submitted,
        completed = stats.completed,
        failed = stats.failed,
        "done"
    );

    ExitCode::SUCCESS
}
