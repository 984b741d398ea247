use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use murmur_audio::{
    analyze_recording, AudioBackend, CpalBackend, DeviceCatalog, DeviceIdentifier, DeviceResolver,
    LevelObserver, RecordingEngine,
};
use murmur_foundation::{real_clock, CaptureConfig, DEFAULT_SILENCE_THRESHOLD};

#[derive(Parser)]
#[command(name = "murmur-probe")]
#[command(version)]
#[command(about = "Murmur microphone diagnostics: list devices, record, analyze")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List input devices after filtering and deduplication
    List {
        /// Show every raw variant grouped by display name instead
        #[arg(long)]
        variants: bool,
    },
    /// Record from a device until the duration or initial-silence timeout
    Record {
        /// Device display name (defaults to the system default input)
        #[arg(short = 'D', long)]
        device: Option<String>,
        /// Output WAV path
        #[arg(short, long, default_value = "recording.wav")]
        output: PathBuf,
        /// Maximum duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
        /// Seconds of initial silence before auto-stop (0 disables)
        #[arg(long, default_value = "4.0")]
        silence_timeout: f64,
    },
    /// Validate a finished recording
    Analyze { path: PathBuf },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::List { variants } => list_devices(variants),
        Commands::Record {
            device,
            output,
            duration,
            silence_timeout,
        } => record(device, output, duration, silence_timeout),
        Commands::Analyze { path } => analyze(&path),
    }
}

fn list_devices(show_variants: bool) -> Result<()> {
    let backend = Arc::new(CpalBackend::new());
    let catalog = DeviceCatalog::new(backend.clone());
    let apis = backend.host_apis();
    let api_name = |index: usize| {
        apis.iter()
            .find(|a| a.index == index)
            .map(|a| a.name.as_str())
            .unwrap_or("unknown")
    };

    if show_variants {
        let default = backend.default_input_device();
        for (name, variants) in catalog.variants() {
            println!("Device: {}", name);
            for v in variants {
                let marker = if default.as_ref().map(|d| d.index == v.index) == Some(true) {
                    " (default)"
                } else {
                    ""
                };
                println!(
                    "  id {:>3}{}  {} ch  {:>6.0} Hz  {}",
                    v.index, marker, v.max_input_channels, v.default_sample_rate, api_name(v.host_api)
                );
            }
        }
        return Ok(());
    }

    let devices = catalog.enumerate();
    if devices.is_empty() {
        println!("No input devices found");
        return Ok(());
    }
    for device in devices {
        println!(
            "id {:>3}  {} ch  {:>6.0} Hz  {:<20}  {}",
            device.index,
            device.max_input_channels,
            device.default_sample_rate,
            api_name(device.host_api),
            device.name
        );
    }
    Ok(())
}

fn record(device: Option<String>, output: PathBuf, duration: u64, silence_timeout: f64) -> Result<()> {
    let backend = Arc::new(CpalBackend::new());
    let catalog = DeviceCatalog::new(backend.clone());

    let selection = match device {
        Some(name) => {
            let found = catalog
                .enumerate()
                .into_iter()
                .find(|d| d.name == name)
                .or_else(|| {
                    // Tolerate truncated or drifted names the way persisted
                    // identifiers are resolved.
                    let resolver = DeviceResolver::new(DeviceCatalog::new(backend.clone()));
                    resolver.resolve(&DeviceIdentifier {
                        name: name.clone(),
                        channels: 0,
                        default_samplerate: 0.0,
                    })
                });
            Some(found.ok_or_else(|| anyhow!("no input device matches '{}'", name))?)
        }
        None => None,
    };

    let config = CaptureConfig {
        silence_threshold: DEFAULT_SILENCE_THRESHOLD,
        silent_start_timeout: (silence_timeout > 0.0).then_some(silence_timeout),
    };

    let mut engine = RecordingEngine::new(backend, config, &output, real_clock());
    let observer: LevelObserver = Arc::new(|level: f32| {
        let filled = (level * 30.0) as usize;
        eprint!("\rlevel [{:<30}]", "#".repeat(filled));
    });
    engine.set_level_observer(observer);

    tracing::info!(device = ?selection.as_ref().map(|d| &d.name), "starting recording");
    engine.start(selection.as_ref())?;

    let deadline = Instant::now() + Duration::from_secs(duration);
    while engine.is_active() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
    engine.stop();
    eprintln!();

    if engine.was_auto_stopped() {
        println!("Recording ended by initial-silence auto-stop");
    }
    let verdict = analyze_recording(&output, config.silence_threshold);
    if verdict.valid {
        println!("Saved valid recording to {}", output.display());
    } else {
        println!("Recording rejected: {}", verdict.reason);
    }
    Ok(())
}

fn analyze(path: &std::path::Path) -> Result<()> {
    let verdict = analyze_recording(path, DEFAULT_SILENCE_THRESHOLD);
    if verdict.valid {
        println!("{}: valid", path.display());
    } else {
        println!("{}: invalid - {}", path.display(), verdict.reason);
    }
    Ok(())
}
