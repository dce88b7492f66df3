//! CLI enum types for reconnect policy options.

use clap::ValueEnum;

use crate::camera::BudgetScope;
use crate::config::BackoffKind;

/// Where the bounded attempt limit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Scope {
    /// Only while `start()` is connecting
    #[default]
    Startup,
    /// Also during reconnection after the camera is lost
    Always,
}

impl From<Scope> for BudgetScope {
    fn from(s: Scope) -> Self {
        match s {
            Scope::Startup => BudgetScope::Startup,
            Scope::Always => BudgetScope::Always,
        }
    }
}

/// Delay growth between startup connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackoffMode {
    #[default]
    Fixed,
    Exponential,
}

impl From<BackoffMode> for BackoffKind {
    fn from(b: BackoffMode) -> Self {
        match b {
            BackoffMode::Fixed => BackoffKind::Fixed,
            BackoffMode::Exponential => BackoffKind::Exponential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_conversion() {
        assert_eq!(BudgetScope::from(Scope::Startup), BudgetScope::Startup);
        assert_eq!(BudgetScope::from(Scope::Always), BudgetScope::Always);
    }

    #[test]
    fn test_backoff_conversion() {
        assert_eq!(BackoffKind::from(BackoffMode::Fixed), BackoffKind::Fixed);
        assert_eq!(
            BackoffKind::from(BackoffMode::Exponential),
            BackoffKind::Exponential
        );
    }
}
