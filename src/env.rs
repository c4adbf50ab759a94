//! Runtime environment detection.
//!
//! Single source of truth for the runtime environment based on the
//! `IVATHY_ENV` environment variable.
//!
//! # Environment Variable
//!
//! Set `IVATHY_ENV` to one of:
//! - `test` - Test mode (config and data live under the crate's `tmp/`)
//! - `development` or `dev` - Development mode
//! - (anything else or unset) - Production mode

/// Runtime environment for ivathy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production environment (default).
    Production,
    /// Development environment.
    Development,
    /// Test environment - keeps files inside the repository's `tmp/`.
    Test,
}

impl Environment {
    /// Detect current environment from `IVATHY_ENV`.
    #[must_use]
    pub fn current() -> Self {
        Self::parse(std::env::var("IVATHY_ENV").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("test") => Self::Test,
            Some("development") | Some("dev") => Self::Development,
            _ => Self::Production,
        }
    }

    /// Returns `true` if this is the test environment.
    #[must_use]
    pub fn is_test(self) -> bool {
        self == Self::Test
    }

    /// Default log filter for this environment.
    #[must_use]
    pub fn default_log_filter(self) -> &'static str {
        match self {
            Self::Production => "info",
            Self::Development | Self::Test => "debug",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
            Self::Test => write!(f, "test"),
        }
    }
}

/// Convenience function to check if running in test mode.
///
/// Equivalent to `Environment::current().is_test()`.
#[must_use]
pub fn is_test_mode() -> bool {
    Environment::current().is_test()
}
