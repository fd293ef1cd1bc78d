//! # Time Windows
//!
//! A window is either relative to the moment a query runs ("the last 300
//! seconds") or pinned to two absolute instants. Windows are validated when a
//! request is built and turned into concrete bounds exactly once per query, so
//! every shard of a fan-out sees the same interval.

use crate::error::SuggestError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the window used when the caller does not supply one.
pub const DEFAULT_RANGE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeWindow {
    /// The most recent `range` seconds before query time.
    Relative { range: i64 },
    /// `from` up to and including `to`.
    Absolute {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// Concrete interval a query runs against. `from` strictly precedes `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Bounds {
    #[inline]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts <= self.to
    }
}

impl TimeWindow {
    pub fn relative(range_secs: i64) -> Self {
        Self::Relative { range: range_secs }
    }

    pub fn absolute(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self::Absolute { from, to }
    }

    /// The window applied when a request carries none.
    pub fn default_window() -> Self {
        Self::relative(DEFAULT_RANGE_SECS)
    }

    /// Reject windows that cannot describe a non-empty interval.
    pub fn validate(&self) -> Result<(), SuggestError> {
        match self {
            Self::Relative { range } => {
                if *range <= 0 {
                    return Err(SuggestError::malformed(format!(
                        "relative time range must be positive, got {}",
                        range
                    )));
                }
                if Duration::try_seconds(*range).is_none() {
                    return Err(SuggestError::malformed(format!(
                        "relative time range {} is out of bounds",
                        range
                    )));
                }
                Ok(())
            }
            Self::Absolute { from, to } => {
                if from >= to {
                    return Err(SuggestError::malformed(format!(
                        "absolute time range must start before it ends ({} >= {})",
                        from.to_rfc3339_opts(SecondsFormat::Secs, true),
                        to.to_rfc3339_opts(SecondsFormat::Secs, true)
                    )));
                }
                Ok(())
            }
        }
    }

    /// Resolve the window against the instant the query is executed.
    pub fn bounds(&self, as_of: DateTime<Utc>) -> Result<Bounds, SuggestError> {
        self.validate()?;
        match self {
            Self::Relative { range } => {
                let from = Duration::try_seconds(*range)
                    .and_then(|span| as_of.checked_sub_signed(span))
                    .ok_or_else(|| {
                        SuggestError::malformed(format!(
                            "relative time range {} reaches before the representable epoch",
                            range
                        ))
                    })?;
                Ok(Bounds { from, to: as_of })
            }
            Self::Absolute { from, to } => Ok(Bounds {
                from: *from,
                to: *to,
            }),
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::default_window()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relative { range } => write!(f, "{} seconds ago - Now", range),
            Self::Absolute { from, to } => write!(
                f,
                "{} - {}",
                from.to_rfc3339_opts(SecondsFormat::Secs, true),
                to.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
        }
    }
}
