//! Subcommand handlers for list-cameras, probe and config actions.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::args::ConfigAction;
use crate::camera::{self, SystemOpener};
use crate::config::{default_path as get_config_path, Config, DEFAULT_CONFIG};

/// List available cameras and print them to stdout.
pub fn list_cameras() {
    match camera::list_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("No cameras found.");
                println!();
                if cfg!(feature = "native") {
                    println!("Make sure your camera is connected and permissions are granted.");
                } else {
                    println!("Built without the native backend; rebuild with --features native.");
                }
                println!("Use 'camwatch probe' to try indices directly.");
            } else {
                println!("Available cameras:");
                for device in devices {
                    println!("  {}", device);
                }
                println!();
                println!("Use --camera <index> to select a camera.");
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Open indices `0..max` one at a time and print the ones that deliver a frame.
pub fn probe(max: u32, config: &Config) {
    let timeout = match config.policy() {
        Ok(policy) => policy.connection_timeout,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Probing camera indices 0..{}...", max);
    let mut opener = SystemOpener::new();
    let found = camera::probe_devices(&mut opener, max, &config.stream_settings(), timeout);

    if found.is_empty() {
        println!("No working cameras found.");
    } else {
        println!("Working cameras:");
        for id in found {
            println!("  {}", id);
        }
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>, config: &Config) {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!("  Camera: {}", config.camera.device);
            println!(
                "  Resolution: {}x{} @ {} fps",
                config.camera.width, config.camera.height, config.camera.fps
            );
            let attempts = if config.reconnect.max_attempts < 1 {
                "unlimited".to_string()
            } else {
                config.reconnect.max_attempts.to_string()
            };
            println!(
                "  Connection attempts: {} ({:?} scope)",
                attempts, config.reconnect.budget_scope
            );
            println!(
                "  Reconnect delay: {}s ({:?})",
                config.reconnect.delay_secs, config.reconnect.backoff
            );
            println!(
                "  Failed frames before link loss: {}",
                config.reconnect.max_failed_frames
            );
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
        }
        ConfigAction::Init => match init_config(&config_path) {
            Ok(()) => println!("Created config file: {}", config_path.display()),
            Err(e @ InitError::Exists(_)) => {
                eprintln!("{}", e);
                eprintln!("Use 'camwatch config show' to view current settings.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
    }
}

/// Errors from `camwatch config init`.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Config file already exists: {}", .0.display())]
    Exists(PathBuf),
    #[error("Error writing config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Write the default config template to `path`, refusing to overwrite.
pub fn init_config(path: &Path) -> Result<(), InitError> {
    if path.exists() {
        return Err(InitError::Exists(path.to_path_buf()));
    }
    let io_error = |source| InitError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, DEFAULT_CONFIG).map_err(io_error)
}
