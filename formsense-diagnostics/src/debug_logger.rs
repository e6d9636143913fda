//! Structured logging setup

use formsense_core::{TrackerError, TrackerResult};
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the default directive applies.
#[derive(Debug, Clone)]
pub struct DebugLogger {
    default_directive: String,
    with_target: bool,
}

impl DebugLogger {
    /// Logger defaulting to `info`
    pub fn new() -> Self {
        Self {
            default_directive: "info".to_string(),
            with_target: false,
        }
    }

    /// Directive used when `RUST_LOG` is unset, e.g. `formsense=debug`
    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    /// Include the module path in each line
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Filter this logger would install
    pub fn filter(&self) -> TrackerResult<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.default_directive).map_err(|e| {
                TrackerError::InvalidConfiguration {
                    message: format!("bad log directive {:?}: {}", self.default_directive, e),
                }
            }),
        }
    }

    /// Install the subscriber. Fails if one is already installed.
    pub fn init(&self) -> TrackerResult<()> {
        tracing_subscriber::fmt()
            .with_env_filter(self.filter()?)
            .with_target(self.with_target)
            .try_init()
            .map_err(|e| TrackerError::InvalidConfiguration {
                message: format!("logging already initialised: {}", e),
            })
    }

    /// Initialize logging with defaults
    pub fn init_logging() -> TrackerResult<()> {
        Self::new().init()
    }
}

impl Default for DebugLogger {
    fn default() -> Self {
        Self::new()
    }
}
