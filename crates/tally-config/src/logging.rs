//! Log output format selected through `--log-format` or `TALLY_LOG_FORMAT`.
//!
//! Parsing ignores ASCII case, so `JSON` and `json` select the same format.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per line, written to the parent-supplied log file
    /// or standard error.
    #[default]
    Json,
    /// Single-line text for reading a worker log by hand.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;
