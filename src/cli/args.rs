//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{BackoffMode, Scope};
use crate::camera::{DeviceId, DEFAULT_PROBE_RANGE};
use crate::config::Config;

/// Camera watcher that keeps a session alive across unplugs and driver hiccups
#[derive(Parser, Debug)]
#[command(name = "camwatch")]
#[command(version, about = "Self-healing camera capture session", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Camera index, device path, or stub:// URL
    #[arg(long)]
    pub camera: Option<DeviceId>,

    /// Requested capture width
    #[arg(long)]
    pub width: Option<u32>,

    /// Requested capture height
    #[arg(long)]
    pub height: Option<u32>,

    /// Requested frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Connection attempts at startup (-1 = retry forever)
    #[arg(long, allow_negative_numbers = true)]
    pub max_reconnect: Option<i64>,

    /// Seconds between connection attempts
    #[arg(long)]
    pub reconnect_delay: Option<f64>,

    /// Where the attempt limit applies
    #[arg(long)]
    pub budget_scope: Option<Scope>,

    /// Delay growth between startup attempts
    #[arg(long)]
    pub backoff: Option<BackoffMode>,

    /// Consecutive empty reads before the camera counts as lost
    #[arg(long)]
    pub max_failed_frames: Option<u32>,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short)]
    pub verbose: bool,

    /// Config file path
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture frames until Ctrl+C (default)
    Run,
    /// List cameras reported by the system
    ListCameras,
    /// Open each camera index in turn and report which deliver frames
    Probe {
        /// Number of indices to try
        #[arg(long, default_value_t = DEFAULT_PROBE_RANGE)]
        max: u32,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show effective configuration
    Show,
    /// Create default config file
    Init,
}

impl Args {
    /// Overlay command-line flags on top of file configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(camera) = &self.camera {
            config.camera.device = camera.clone();
        }
        if let Some(width) = self.width {
            config.camera.width = width;
        }
        if let Some(height) = self.height {
            config.camera.height = height;
        }
        if let Some(fps) = self.fps {
            config.camera.fps = fps;
        }
        if let Some(max) = self.max_reconnect {
            config.reconnect.max_attempts = max;
        }
        if let Some(delay) = self.reconnect_delay {
            config.reconnect.delay_secs = delay;
        }
        if let Some(scope) = self.budget_scope {
            config.reconnect.budget_scope = scope.into();
        }
        if let Some(backoff) = self.backoff {
            config.reconnect.backoff = backoff.into();
        }
        if let Some(threshold) = self.max_failed_frames {
            config.reconnect.max_failed_frames = threshold;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::BudgetScope;
    use crate::config::BackoffKind;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["camwatch"]);
        assert!(args.camera.is_none());
        assert!(args.max_reconnect.is_none());
        assert!(args.frames.is_none());
        assert!(!args.verbose);
        assert!(args.config.is_none());
        assert!(args.command.is_none());
    }

    #[test]
    fn test_args_camera_index_and_path() {
        let args = Args::parse_from(["camwatch", "--camera", "2"]);
        assert_eq!(args.camera, Some(DeviceId::Index(2)));

        let args = Args::parse_from(["camwatch", "--camera", "stub://flaky"]);
        assert_eq!(args.camera, Some(DeviceId::Path("stub://flaky".to_string())));
    }

    #[test]
    fn test_args_negative_max_reconnect() {
        let args = Args::parse_from(["camwatch", "--max-reconnect", "-1"]);
        assert_eq!(args.max_reconnect, Some(-1));
    }

    #[test]
    fn test_args_budget_scope_values() {
        let args = Args::parse_from(["camwatch", "--budget-scope", "always"]);
        assert_eq!(args.budget_scope, Some(Scope::Always));

        let args = Args::parse_from(["camwatch", "--budget-scope", "startup"]);
        assert_eq!(args.budget_scope, Some(Scope::Startup));
    }

    #[test]
    fn test_args_verbose_flag() {
        let args = Args::parse_from(["camwatch", "-v"]);
        assert!(args.verbose);
    }

    #[test]
    fn test_args_config_option() {
        let args = Args::parse_from(["camwatch", "-c", "/tmp/test.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/test.toml")));
    }

    #[test]
    fn test_args_probe_subcommand() {
        let args = Args::parse_from(["camwatch", "probe"]);
        assert!(matches!(
            args.command,
            Some(Command::Probe {
                max: DEFAULT_PROBE_RANGE
            })
        ));

        let args = Args::parse_from(["camwatch", "probe", "--max", "3"]);
        assert!(matches!(args.command, Some(Command::Probe { max: 3 })));
    }

    #[test]
    fn test_args_list_cameras_subcommand() {
        let args = Args::parse_from(["camwatch", "list-cameras"]);
        assert!(matches!(args.command, Some(Command::ListCameras)));
    }

    #[test]
    fn test_args_config_init_subcommand() {
        let args = Args::parse_from(["camwatch", "config", "init"]);
        assert!(matches!(
            args.command,
            Some(Command::Config {
                action: ConfigAction::Init
            })
        ));
    }

    #[test]
    fn test_args_override_config() {
        let mut config = Config::parse("[camera]\ndevice = 3\nwidth = 320\n").unwrap();
        let args = Args::parse_from([
            "camwatch",
            "--camera",
            "stub://ok",
            "--max-reconnect",
            "3",
            "--budget-scope",
            "always",
            "--backoff",
            "exponential",
        ]);
        args.apply(&mut config);

        assert_eq!(config.camera.device, DeviceId::Path("stub://ok".to_string()));
        // Untouched flags keep file values
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.budget_scope, BudgetScope::Always);
        assert_eq!(config.reconnect.backoff, BackoffKind::Exponential);
    }

    #[test]
    fn test_args_without_flags_keep_config() {
        let mut config = Config::parse("[reconnect]\ndelay_secs = 0.25\n").unwrap();
        Args::parse_from(["camwatch"]).apply(&mut config);
        assert_eq!(config.reconnect.delay_secs, 0.25);
        assert_eq!(config.reconnect.max_attempts, -1);
    }
}
