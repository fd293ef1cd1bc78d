//! # Time Window Resolution
//!
//! An absent window is a legitimate default case. A present but malformed one
//! is caller error and is reported, never replaced.

use qy_core::{SuggestError, TimeWindow, DEFAULT_RANGE_SECS};

pub struct TimeWindowResolver {
    default_range_secs: i64,
}

impl TimeWindowResolver {
    /// `default_range_secs` must be positive; anything else falls back to
    /// [`DEFAULT_RANGE_SECS`].
    pub fn new(default_range_secs: i64) -> Self {
        let default_range_secs = if default_range_secs > 0 {
            default_range_secs
        } else {
            DEFAULT_RANGE_SECS
        };
        Self { default_range_secs }
    }

    pub fn resolve(&self, requested: Option<&TimeWindow>) -> Result<TimeWindow, SuggestError> {
        match requested {
            Some(window) => {
                window.validate()?;
                Ok(window.clone())
            }
            None => Ok(TimeWindow::relative(self.default_range_secs)),
        }
    }
}

impl Default for TimeWindowResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RANGE_SECS)
    }
}
