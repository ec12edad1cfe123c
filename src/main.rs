use anyhow::Result;
use clap::Parser;
use framegate::pose::{landmark_ids, Landmark};
use framegate::{
    Artifact, EventBus, FrameData, FramegateConfig, GateRuntime, MemorySink, NullSurface,
    PoseSource, SyntheticCamera, UserIntent,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "framegate")]
#[command(about = "Recording admission controller gated on body framing and ambient lighting")]
#[command(version)]
#[command(long_about = "Gates a camera recording session on two live safety conditions: \
the subject's full body must be framed in the shot and ambient lighting must stay within \
an acceptable band. Recording is admitted only while both hold and is interrupted the \
moment either degrades. This binary runs the pipeline against synthetic demo sources; \
real deployments plug camera, pose, and encoder backends into the library traits.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "framegate.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Directory finalized recordings are written to
    #[arg(long, default_value = "./recordings", help = "Output directory for finalized recordings")]
    output_dir: PathBuf,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

/// Demo pose source: a torso that drifts horizontally across the frame,
/// so framing validity flips as it nears the edge.
struct DriftingPose {
    cycles: AtomicU64,
}

#[async_trait::async_trait]
impl PoseSource for DriftingPose {
    async fn detect(&self, _frame: &FrameData) -> framegate::Result<Option<Vec<Landmark>>> {
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst);
        // Triangle wave between 0.15 and 0.85 over 40 detection cycles
        let phase = (cycle % 40) as f64 / 40.0;
        let cx = if phase < 0.5 {
            0.15 + phase * 1.4
        } else {
            0.85 - (phase - 0.5) * 1.4
        };

        Ok(Some(vec![
            Landmark::new(landmark_ids::LEFT_SHOULDER, cx - 0.05, 0.40, 0.0, 0.9),
            Landmark::new(landmark_ids::RIGHT_SHOULDER, cx + 0.05, 0.40, 0.0, 0.9),
            Landmark::new(landmark_ids::LEFT_HIP, cx - 0.05, 0.52, 0.0, 0.9),
        ]))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting framegate v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match FramegateConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    tokio::fs::create_dir_all(&args.output_dir).await?;

    let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
    let (artifact_tx, artifact_rx) = mpsc::unbounded_channel();
    let (intent_tx, intent_rx) = mpsc::channel(16);

    // Demo wiring: a synthetic mid-gray camera scene (within the lighting
    // band) and a drifting pose that crosses in and out of valid framing.
    let runtime = GateRuntime::new(
        config,
        Arc::new(SyntheticCamera::single(128)),
        Arc::new(DriftingPose {
            cycles: AtomicU64::new(0),
        }),
        Arc::new(MemorySink::new()),
        Box::new(NullSurface),
        event_bus,
        artifact_tx,
    );

    tokio::spawn(persist_artifacts(artifact_rx, args.output_dir.clone()));
    tokio::spawn(demo_intents(intent_tx));

    runtime.run(intent_rx).await?;

    info!("framegate exited cleanly");
    Ok(())
}

/// Periodically ask to record; the controller admits or denies based on
/// the live validity signals.
async fn demo_intents(intent_tx: mpsc::Sender<UserIntent>) {
    let mut interval = tokio::time::interval(Duration::from_secs(2));
    loop {
        interval.tick().await;
        if intent_tx.send(UserIntent::RequestStart).await.is_err() {
            break;
        }
    }
}

/// Write finalized artifacts to the output directory
async fn persist_artifacts(mut artifacts: mpsc::UnboundedReceiver<Artifact>, output_dir: PathBuf) {
    while let Some(artifact) = artifacts.recv().await {
        let path = output_dir.join(artifact.suggested_file_name());
        match tokio::fs::write(&path, &artifact.data).await {
            Ok(()) => info!(
                "Saved {} ({} frames, {} bytes)",
                path.display(),
                artifact.frame_count,
                artifact.data.len()
            ),
            Err(e) => error!("Failed to save {}: {}", path.display(), e),
        }
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("framegate={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# framegate configuration file");
    println!("# Default values for all available options");
    println!();
    println!("{}", toml::to_string_pretty(&FramegateConfig::default())?);
    Ok(())
}
