use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use barcam::camera::mock::{MockCamera, MockCameraProvider};
use barcam::error::EventBusError;
use barcam::{
    spawn_event_handler, BarcamConfig, BarcodeDecoder, BarcodeFormat, DecodeHints, DecodeResult,
    DecodeError, DisplayRotation, EventBus, EventFilter, EventHandler, LuminanceSource, ScannerEvent,
    ScannerSession,
};

/// Luminance value the simulated camera writes into frames that carry a code
const MARKER: u8 = 0xFF;
/// Every this many simulated frames carries a code
const MARKER_PERIOD: u64 = 45;
const SIMULATED_FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Parser, Debug)]
#[command(name = "barcam")]
#[command(about = "Camera frame scheduling and configuration engine for barcode scanning")]
#[command(version)]
#[command(long_about = "Drives a camera for barcode scanning: throttles preview frames into a \
single-flight decoder, negotiates camera parameters and keeps focus and orientation correct. \
Without a hardware backend the binary runs a simulated session against a mock camera.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "barcam.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without opening a camera")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Length of the simulated session; runs until Ctrl-C when omitted
    #[arg(long, value_name = "SECONDS", help = "Run a simulated scan session for this many seconds")]
    simulate_seconds: Option<u64>,

    /// Directory for grayscale snapshots of frames that carried a code
    #[cfg(feature = "debug_frames")]
    #[arg(long, value_name = "DIR", help = "Save decoded simulated frames as PNG files in DIR")]
    dump_frames: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting barcam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match BarcamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    run_simulation(config, &args).await
}

/// Scan session against a mock camera that periodically shows a code
async fn run_simulation(config: BarcamConfig, args: &Args) -> Result<()> {
    let seconds = args.simulate_seconds;
    let camera = MockCamera::typical_back();
    let provider = Arc::new(MockCameraProvider::new(vec![camera.clone()]));

    let capacity = config.system.event_bus_capacity;
    let event_bus = if args.debug {
        EventBus::with_debug_logging(capacity)
    } else {
        EventBus::new(capacity)
    };

    let decoder = MarkerDecoder {
        #[cfg(feature = "debug_frames")]
        dump_dir: args.dump_frames.clone(),
    };

    let session = ScannerSession::builder()
        .config(config)
        .provider(provider)
        .decoder(Arc::new(decoder))
        .event_bus(Arc::new(event_bus))
        .build()?;
    info!("Simulated session {} ready", session.id());

    let printer = spawn_event_handler(&session.event_bus(), Arc::new(JsonLinesPrinter));

    session.setup_camera()?;
    session.resume_analysis();

    let capture = camera.spawn_capture_loop(
        SIMULATED_FRAME_INTERVAL,
        Arc::new(|tick: u64, buf: &mut [u8]| {
            let value = if tick % MARKER_PERIOD == 0 { MARKER } else { 0x10 };
            buf.fill(value);
        }),
    );

    // exercise the control path once the preview is running
    tokio::time::sleep(Duration::from_millis(500)).await;
    session.set_view_size(1080, 1920);
    session.auto_focus_at(540.0, 960.0);
    session.set_display_rotation(DisplayRotation::Rotation90);

    match seconds {
        Some(seconds) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {
                    info!("Simulation finished after {} seconds", seconds);
                }
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted");
        }
    }

    capture.abort();
    session.shutdown_camera();

    let stats = session.stats();
    info!(
        "Frames received {}, analyzed {}, dropped {}, barcodes found {}, decode failures {}",
        stats.frames_received,
        stats.frames_analyzed,
        stats.frames_dropped,
        stats.barcodes_found,
        stats.decode_failures
    );

    // let the printer drain what is left on the bus
    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();

    Ok(())
}

/// Reports a fixed code for frames whose first pixel is the marker value
struct MarkerDecoder {
    #[cfg(feature = "debug_frames")]
    dump_dir: Option<std::path::PathBuf>,
}

impl MarkerDecoder {
    #[cfg(feature = "debug_frames")]
    fn dump(&self, source: &LuminanceSource<'_>) {
        use tracing::{debug, warn};

        let Some(dir) = &self.dump_dir else {
            return;
        };

        let name = format!("marker-{}.png", chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"));
        let path = dir.join(name);
        match source.to_gray_image().save(&path) {
            Ok(()) => debug!("Saved decoded frame to {}", path.display()),
            Err(e) => warn!("Failed to save frame to {}: {}", path.display(), e),
        }
    }
}

impl BarcodeDecoder for MarkerDecoder {
    fn name(&self) -> &str {
        "marker"
    }

    fn decode(
        &self,
        source: &LuminanceSource<'_>,
        hints: &DecodeHints,
    ) -> std::result::Result<Option<DecodeResult>, DecodeError> {
        if source.pixel(0, 0) != MARKER {
            return Ok(None);
        }

        #[cfg(feature = "debug_frames")]
        self.dump(source);

        let format = hints
            .possible_formats
            .first()
            .copied()
            .unwrap_or(BarcodeFormat::QrCode);
        Ok(Some(DecodeResult::new("barcam-simulated", format)))
    }
}

/// Prints every decoded barcode as one JSON object per line
struct JsonLinesPrinter;

#[async_trait]
impl EventHandler for JsonLinesPrinter {
    async fn handle_event(&self, event: ScannerEvent) -> std::result::Result<(), EventBusError> {
        if let ScannerEvent::BarcodeFound { result, frame_id } = event {
            let line = serde_json::json!({
                "frame_id": frame_id,
                "format": result.format,
                "text": result.text,
                "timestamp": result.timestamp,
            });
            println!("{}", line);
        }
        Ok(())
    }

    fn handler_name(&self) -> &str {
        "json_lines_printer"
    }

    fn event_filter(&self) -> EventFilter {
        EventFilter::EventTypes(vec!["barcode_found"])
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
        .unwrap_or_else(|_| EnvFilter::new(format!("barcam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
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
    println!("# barcam configuration file");
    println!("# Every option with its default value. Environment variables override");
    println!("# file values, e.g. BARCAM_SCANNING__PURE_BARCODE=true");
    println!();
    println!("{}", toml::to_string_pretty(&BarcamConfig::default())?);
    Ok(())
}
