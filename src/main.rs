use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;

use camwatch::camera::{DeviceSession, LinkState, SystemOpener};
use camwatch::capture_loop::{install_ctrlc_handler, CaptureLoop, LoopExit, LoopSummary};
use camwatch::cli::{self, Args, Command};
use camwatch::config::Config;

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // If --config is specified, require the file to exist.
    // Otherwise, fall back to defaults if the default config is unusable.
    let mut config = match &args.config {
        Some(path) => match Config::load_from_explicit(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => match Config::load(None) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                eprintln!("Using default settings.\n");
                Config::default()
            }
        },
    };

    // CLI args > config file > built-in defaults
    args.apply(&mut config);

    match args.command {
        Some(Command::ListCameras) => cli::list_cameras(),
        Some(Command::Probe { max }) => cli::probe(max, &config),
        Some(Command::Config { action }) => {
            cli::handle_config_action(action, args.config.as_deref(), &config)
        }
        Some(Command::Run) | None => {
            if let Err(e) = run(&config, args.frames) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run(config: &Config, frames: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let policy = config.policy()?;
    let mut pacing = config.loop_config()?;
    pacing.max_frames = frames;

    let mut session = DeviceSession::new(
        config.camera.device.clone(),
        config.stream_settings(),
        policy,
        SystemOpener::new(),
    );
    session.on_transition(|from, to| match (from, to) {
        (_, LinkState::LinkLost) => eprintln!("\n*** Camera lost, waiting for it to come back ***\n"),
        (LinkState::Connecting, LinkState::Connected) => eprintln!("*** Camera connected ***"),
        (_, LinkState::Failed) => eprintln!("*** Giving up on camera ***"),
        _ => {}
    });

    println!("Connecting to camera {}...", config.camera.device);
    session.start()?;
    if let Some(resolution) = session.actual_resolution() {
        println!("Camera opened at {}", resolution);
    }

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(Arc::clone(&stop))?;
    println!("Capturing. Press Ctrl+C to stop.");

    let summary = CaptureLoop::new(pacing, stop).run(&mut session);
    session.release();
    print_summary(&summary);

    if summary.exit == LoopExit::SessionFailed {
        return Err("camera session failed".into());
    }
    Ok(())
}

fn print_summary(summary: &LoopSummary) {
    println!();
    println!("Session statistics:");
    println!("  Frames processed: {}", summary.frames);
    println!("  Reconnections: {}", summary.reconnections);
    println!("  Disconnections: {}", summary.disconnections);
    if summary.disconnections > 0 {
        println!(
            "  Total disconnected time: {:.1}s",
            summary.total_disconnected.as_secs_f64()
        );
        println!(
            "  Average outage: {:.1}s",
            summary.average_outage().as_secs_f64()
        );
    }
    if summary.transient_failures > 0 || summary.errors > 0 {
        println!(
            "  Dropped reads: {} ({} device errors)",
            summary.transient_failures, summary.errors
        );
    }
}
