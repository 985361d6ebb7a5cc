//! Log output settings shared with the telemetry layer.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Shape of each emitted log record.
///
/// Parsed case-insensitively from configuration files, `TRELLIS_LOG_FORMAT`
/// and `--log-format`.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per record, fields flattened to the top level.
    #[default]
    Json,
    /// One terse line per record.
    Compact,
    /// Multi-line records with source locations, for local debugging.
    Pretty,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter for serde and `ortho_config` defaults.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default log format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::default()
}
