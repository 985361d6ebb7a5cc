//! Shared configuration for Trellis resources.
//!
//! Configuration is layered with `ortho_config`: built-in defaults, then an
//! optional configuration file (`--config-path` or `TRELLIS_CONFIG_PATH`),
//! then `TRELLIS_*` environment variables, then command-line flags. The
//! resolved [`Config`] drives telemetry and the serializer and dispatch
//! settings built by the `trellis` crate.

mod defaults;
mod logging;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_EXCLUDED_FIELDS, DEFAULT_OUTPUT_NAME, DEFAULT_OUTPUT_PARAMETER, default_excluded_fields,
    default_output_parameter,
};
pub use logging::{
    DEFAULT_LOG_FILTER, LogFormat, LogFormatParseError, default_log_filter,
    default_log_filter_string, default_log_format,
};

/// Resolved configuration shared by every resource in a process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TRELLIS")]
pub struct Config {
    /// Tracing filter expression, in `EnvFilter` syntax.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log lines.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Exposes crash reports to callers when an unexpected fault occurs.
    #[ortho_config(default = false)]
    pub verbose_diagnostics: bool,
    /// Entity fields withheld from serialized output. Replaces the built-in
    /// set when present.
    pub excluded_fields: Option<Vec<String>>,
    /// Query parameter naming the requested output representation.
    #[ortho_config(default = default_output_parameter())]
    pub output_parameter: String,
}

impl Config {
    /// Returns the configured tracing filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns whether crash reports are exposed to callers.
    #[must_use]
    pub const fn verbose_diagnostics(&self) -> bool {
        self.verbose_diagnostics
    }

    /// Returns the effective exclusion set, falling back to
    /// [`DEFAULT_EXCLUDED_FIELDS`].
    #[must_use]
    pub fn excluded_fields(&self) -> Vec<String> {
        self.excluded_fields
            .clone()
            .unwrap_or_else(default_excluded_fields)
    }

    /// Returns the query parameter selecting the output representation.
    #[must_use]
    pub fn output_parameter(&self) -> &str {
        self.output_parameter.as_str()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            verbose_diagnostics: false,
            excluded_fields: None,
            output_parameter: default_output_parameter(),
        }
    }
}
