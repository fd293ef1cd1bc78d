//! # qy-core — The "Vocabulary" of QUARRY
//!
//! Shared types for field-value suggestions: what a caller asks for
//! ([`SuggestRequest`]), what an index shard answers ([`ValueCount`]), and
//! what the caller gets back ([`SuggestionResponse`]).
//!
//! The [`SuggestionCandidate`] carries the ranking key of the whole system:
//! occurrence descending, then value ascending. It is implemented via [`Ord`]
//! so every sort in the workspace agrees on it.

pub mod error;
pub mod merge;
pub mod window;

use core::cmp::Ordering;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use error::{RetrievalError, SuggestError};
pub use merge::{merge_observations, rank, Ranked};
pub use window::{Bounds, TimeWindow, DEFAULT_RANGE_SECS};

/// Number of suggestions returned when nothing else is configured.
pub const DEFAULT_LIMIT: usize = 20;

/// Streams a query actually runs against. May legally be empty.
pub type EffectiveScope = BTreeSet<String>;

// =============================================================================
// Request
// =============================================================================

/// A caller's suggestion request, as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestRequest {
    /// Field whose values are suggested. Required, non-empty.
    #[serde(default)]
    pub field: String,
    /// Prefix typed so far. Empty means "most frequent values".
    #[serde(default)]
    pub input: String,
    /// Requested streams. Empty means "everything the caller may read".
    #[serde(default)]
    pub streams: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timerange: Option<TimeWindow>,
    /// Requested number of suggestions; clamped by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl SuggestRequest {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_streams<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.streams = streams.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timerange(mut self, window: TimeWindow) -> Self {
        self.timerange = Some(window);
        self
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Boundary validation. Runs before any permission or index call.
    pub fn validate(&self) -> Result<(), SuggestError> {
        if self.field.trim().is_empty() {
            return Err(SuggestError::malformed("field must not be empty"));
        }
        if let Some(window) = &self.timerange {
            window.validate()?;
        }
        if self.size == Some(0) {
            return Err(SuggestError::malformed("size must be at least 1"));
        }
        Ok(())
    }
}

// =============================================================================
// Index observations
// =============================================================================

/// One partial observation from an index shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

impl ValueCount {
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }
}

/// How `input` is compared against candidate values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixCase {
    #[default]
    Sensitive,
    Insensitive,
}

impl PrefixCase {
    /// `true` if `value` starts with `prefix` under this policy. An empty
    /// prefix matches everything.
    pub fn matches(self, value: &str, prefix: &str) -> bool {
        if prefix.is_empty() {
            return true;
        }
        match self {
            Self::Sensitive => value.starts_with(prefix),
            Self::Insensitive => value.to_lowercase().starts_with(&prefix.to_lowercase()),
        }
    }
}

// =============================================================================
// Response
// =============================================================================

/// A distinct field value and how often it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionCandidate {
    pub value: String,
    pub occurrence: u64,
}

// Ranking order, not natural order: "smaller" means "ranked first".
impl Ord for SuggestionCandidate {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .occurrence
            .cmp(&self.occurrence)
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for SuggestionCandidate {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub field: String,
    pub input: String,
    pub suggestions: Vec<SuggestionCandidate>,
    #[serde(default)]
    pub sum_other_occurrences: u64,
}

impl SuggestionResponse {
    /// A response with no candidates, e.g. for an empty stream scope.
    pub fn empty(field: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            input: input.into(),
            suggestions: Vec::new(),
            sum_other_occurrences: 0,
        }
    }

    pub fn from_ranked(field: impl Into<String>, input: impl Into<String>, ranked: Ranked) -> Self {
        Self {
            field: field.into(),
            input: input.into(),
            suggestions: ranked.suggestions,
            sum_other_occurrences: ranked.sum_other_occurrences,
        }
    }
}
