//! # Suggestion Engine
//!
//! Fans a field-value aggregation out to every index shard, merges the
//! partial observations, ranks them and cuts the result to the limit.
//!
//! The fan-out is all-or-nothing: the first shard error, or the request
//! timeout, fails the call and drops every outstanding sub-query.

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use qy_core::{
    merge_observations, rank, Bounds, EffectiveScope, PrefixCase, RetrievalError, SuggestError,
    SuggestionResponse, TimeWindow, ValueCount,
};
use std::sync::Arc;
use std::time::Duration;

/// A scoped, time-bounded, prefix-filtered aggregation over one field.
#[derive(Debug, Clone)]
pub struct FieldValueQuery {
    pub field: String,
    /// Empty means "no prefix filter".
    pub prefix: String,
    pub case: PrefixCase,
    pub streams: EffectiveScope,
    /// Resolved once per request so all shards agree on the interval.
    pub bounds: Bounds,
}

impl FieldValueQuery {
    #[inline]
    pub fn matches_value(&self, value: &str) -> bool {
        self.case.matches(value, &self.prefix)
    }
}

/// One partition of the index. Answers with unmerged, untruncated counts.
#[async_trait::async_trait]
pub trait IndexShard: Send + Sync {
    fn id(&self) -> &str;

    async fn query_field_values(
        &self,
        query: &FieldValueQuery,
    ) -> Result<Vec<ValueCount>, RetrievalError>;
}

pub struct SuggestionEngine {
    shards: Vec<Arc<dyn IndexShard>>,
    case: PrefixCase,
    timeout: Duration,
}

impl SuggestionEngine {
    pub fn new(shards: Vec<Arc<dyn IndexShard>>, case: PrefixCase, timeout: Duration) -> Self {
        Self {
            shards,
            case,
            timeout,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub async fn suggest(
        &self,
        field: &str,
        input: &str,
        scope: &EffectiveScope,
        window: &TimeWindow,
        limit: usize,
    ) -> Result<SuggestionResponse, SuggestError> {
        self.suggest_as_of(field, input, scope, window, limit, Utc::now())
            .await
    }

    /// Same as [`suggest`](Self::suggest) with relative windows anchored at `as_of`.
    pub async fn suggest_as_of(
        &self,
        field: &str,
        input: &str,
        scope: &EffectiveScope,
        window: &TimeWindow,
        limit: usize,
        as_of: DateTime<Utc>,
    ) -> Result<SuggestionResponse, SuggestError> {
        if field.trim().is_empty() {
            return Err(SuggestError::malformed("field must not be empty"));
        }
        if scope.is_empty() {
            return Ok(SuggestionResponse::empty(field, input));
        }

        let query = FieldValueQuery {
            field: field.to_string(),
            prefix: input.to_string(),
            case: self.case,
            streams: scope.clone(),
            bounds: window.bounds(as_of)?,
        };

        let partials = self.fan_out(&query).await?;
        let merged = merge_observations(partials.into_iter().flatten());
        Ok(SuggestionResponse::from_ranked(
            field,
            input,
            rank(merged, limit),
        ))
    }

    async fn fan_out(&self, query: &FieldValueQuery) -> Result<Vec<Vec<ValueCount>>, RetrievalError> {
        let sub_queries = self
            .shards
            .iter()
            .map(|shard| shard.query_field_values(query));

        match tokio::time::timeout(self.timeout, try_join_all(sub_queries)).await {
            Ok(result) => result,
            Err(_) => Err(RetrievalError::Timeout(self.timeout_ms())),
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Shard double answering from a fixed script.
    pub(crate) struct ScriptedShard {
        id: String,
        answer: Result<Vec<ValueCount>, RetrievalError>,
        delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl ScriptedShard {
        pub(crate) fn answering(id: &str, pairs: &[(&str, u64)]) -> Self {
            Self {
                id: id.into(),
                answer: Ok(pairs.iter().map(|(v, c)| ValueCount::new(*v, *c)).collect()),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing(id: &str) -> Self {
            Self {
                id: id.into(),
                answer: Err(RetrievalError::Unavailable {
                    shard: id.into(),
                    reason: "connection refused".into(),
                }),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn slow(id: &str, delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::answering(id, &[("late", 1)])
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl IndexShard for ScriptedShard {
        fn id(&self) -> &str {
            &self.id
        }

        async fn query_field_values(
            &self,
            _query: &FieldValueQuery,
        ) -> Result<Vec<ValueCount>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.answer.clone()
        }
    }

    fn scope(items: &[&str]) -> EffectiveScope {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn engine(shards: Vec<Arc<ScriptedShard>>) -> SuggestionEngine {
        SuggestionEngine::new(
            shards
                .into_iter()
                .map(|s| s as Arc<dyn IndexShard>)
                .collect(),
            PrefixCase::Sensitive,
            Duration::from_secs(5),
        )
    }

    fn pairs(response: &SuggestionResponse) -> Vec<(&str, u64)> {
        response
            .suggestions
            .iter()
            .map(|c| (c.value.as_str(), c.occurrence))
            .collect()
    }

    #[tokio::test]
    async fn test_ranks_with_value_tie_break() {
        let shard = Arc::new(ScriptedShard::answering(
            "shard-0",
            &[("b", 5), ("c", 3), ("a", 5)],
        ));
        let response = engine(vec![shard])
            .suggest("host", "", &scope(&["s1", "s2"]), &TimeWindow::default(), 20)
            .await
            .unwrap();
        assert_eq!(pairs(&response), vec![("a", 5), ("b", 5), ("c", 3)]);
        assert_eq!(response.field, "host");
        assert_eq!(response.input, "");
    }

    #[tokio::test]
    async fn test_empty_scope_skips_index() {
        let shard = Arc::new(ScriptedShard::answering("shard-0", &[("a", 1)]));
        let response = engine(vec![shard.clone()])
            .suggest("host", "web", &EffectiveScope::new(), &TimeWindow::default(), 20)
            .await
            .unwrap();
        assert!(response.suggestions.is_empty());
        assert_eq!(response.input, "web");
        assert_eq!(shard.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_field_rejected_before_dispatch() {
        let shard = Arc::new(ScriptedShard::answering("shard-0", &[("a", 1)]));
        let err = engine(vec![shard.clone()])
            .suggest("", "", &scope(&["s1"]), &TimeWindow::default(), 20)
            .await
            .unwrap_err();
        assert!(matches!(err, SuggestError::MalformedRequest(_)));
        assert_eq!(shard.calls(), 0);
    }

    #[tokio::test]
    async fn test_merges_across_shards_before_truncating() {
        let shards = vec![
            Arc::new(ScriptedShard::answering("shard-0", &[("local-0", 5), ("global", 4)])),
            Arc::new(ScriptedShard::answering("shard-1", &[("local-1", 5), ("global", 4)])),
            Arc::new(ScriptedShard::answering("shard-2", &[("global", 4)])),
        ];
        let response = engine(shards.clone())
            .suggest("host", "", &scope(&["s1"]), &TimeWindow::default(), 1)
            .await
            .unwrap();
        assert_eq!(pairs(&response), vec![("global", 12)]);
        assert_eq!(response.sum_other_occurrences, 10);
        assert!(shards.iter().all(|s| s.calls() == 1));
    }

    #[tokio::test]
    async fn test_shard_order_does_not_matter() {
        let a = || Arc::new(ScriptedShard::answering("a", &[("x", 2), ("y", 3)]));
        let b = || Arc::new(ScriptedShard::answering("b", &[("y", 1), ("z", 4), ("x", 2)]));

        let window = TimeWindow::default();
        let forward = engine(vec![a(), b()])
            .suggest("f", "", &scope(&["s"]), &window, 20)
            .await
            .unwrap();
        let backward = engine(vec![b(), a()])
            .suggest("f", "", &scope(&["s"]), &window, 20)
            .await
            .unwrap();
        assert_eq!(forward, backward);
        assert_eq!(pairs(&forward), vec![("x", 4), ("y", 4), ("z", 4)]);
    }

    #[tokio::test]
    async fn test_any_shard_failure_fails_whole_call() {
        let shards = vec![
            Arc::new(ScriptedShard::answering("shard-0", &[("a", 9)])),
            Arc::new(ScriptedShard::failing("shard-1")),
        ];
        let err = engine(shards)
            .suggest("host", "", &scope(&["s1"]), &TimeWindow::default(), 20)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SuggestError::RetrievalFailure(RetrievalError::Unavailable { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_shard_times_out() {
        let shards = vec![
            Arc::new(ScriptedShard::answering("shard-0", &[("a", 9)])),
            Arc::new(ScriptedShard::slow("shard-1", Duration::from_secs(60))),
        ];
        let err = engine(shards)
            .suggest("host", "", &scope(&["s1"]), &TimeWindow::default(), 20)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SuggestError::RetrievalFailure(RetrievalError::Timeout(5_000))
        );
    }

    #[test]
    fn test_reported_timeout_saturates() {
        let saturated = SuggestionEngine::new(
            Vec::new(),
            PrefixCase::Sensitive,
            Duration::from_secs(u64::MAX),
        );
        assert_eq!(saturated.timeout_ms(), u64::MAX);
        assert_eq!(engine(vec![]).timeout_ms(), 5_000);
    }

    #[tokio::test]
    async fn test_window_resolved_once_for_all_shards() {
        struct Recording {
            seen: std::sync::Mutex<Vec<Bounds>>,
        }

        #[async_trait::async_trait]
        impl IndexShard for Recording {
            fn id(&self) -> &str {
                "recording"
            }

            async fn query_field_values(
                &self,
                query: &FieldValueQuery,
            ) -> Result<Vec<ValueCount>, RetrievalError> {
                self.seen.lock().unwrap().push(query.bounds);
                Ok(Vec::new())
            }
        }

        let recorder = Arc::new(Recording {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let engine = SuggestionEngine::new(
            vec![
                recorder.clone() as Arc<dyn IndexShard>,
                recorder.clone() as Arc<dyn IndexShard>,
            ],
            PrefixCase::Insensitive,
            Duration::from_secs(1),
        );
        let as_of = Utc.timestamp_opt(10_000, 0).unwrap();
        engine
            .suggest_as_of("host", "", &scope(&["s1"]), &TimeWindow::relative(60), 20, as_of)
            .await
            .unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert_eq!(seen[0].to, as_of);
        assert_eq!(seen[0].from, Utc.timestamp_opt(9_940, 0).unwrap());
    }
}
