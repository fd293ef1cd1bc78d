//! # Field-Value Suggestions
//!
//! Request pipeline: validate at the boundary, resolve the stream scope for
//! the caller, resolve the time window, then hand off to the engine.
//!
//! ```text
//! SuggestRequest ──► validate ──► AccessScopeResolver ──► TimeWindowResolver ──► SuggestionEngine
//!                                  (PermissionOracle)                            (IndexShard × N)
//! ```

pub mod engine;
pub mod scope;
pub mod window;

use crate::auth::Identity;
use engine::SuggestionEngine;
use qy_core::{SuggestError, SuggestRequest, SuggestionResponse};
use scope::AccessScopeResolver;
use window::TimeWindowResolver;

pub struct SuggestService {
    scope: AccessScopeResolver,
    window: TimeWindowResolver,
    engine: SuggestionEngine,
    limit: usize,
    max_limit: usize,
}

impl SuggestService {
    pub fn new(
        scope: AccessScopeResolver,
        window: TimeWindowResolver,
        engine: SuggestionEngine,
        limit: usize,
        max_limit: usize,
    ) -> Self {
        let max_limit = max_limit.max(1);
        Self {
            scope,
            window,
            engine,
            limit: limit.clamp(1, max_limit),
            max_limit,
        }
    }

    pub fn engine(&self) -> &SuggestionEngine {
        &self.engine
    }

    pub async fn suggest(
        &self,
        caller: &Identity,
        request: SuggestRequest,
    ) -> Result<SuggestionResponse, SuggestError> {
        request.validate()?;

        let limit = request
            .size
            .map_or(self.limit, |size| size.min(self.max_limit));
        let scope = self.scope.resolve(caller, &request.streams).await?;
        let window = self.window.resolve(request.timerange.as_ref())?;

        tracing::debug!(
            caller = %caller.key_id,
            label = %caller.label,
            field = %request.field,
            scope = scope.len(),
            window = %window,
            limit,
            "Suggest"
        );

        self.engine
            .suggest(&request.field, &request.input, &scope, &window, limit)
            .await
            .inspect_err(|e| {
                if e.is_retryable() {
                    tracing::warn!(field = %request.field, "Suggestion retrieval failed: {}", e);
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::engine::tests::ScriptedShard;
    use super::engine::IndexShard;
    use super::scope::tests::FixedOracle;
    use super::scope::UnreadableStreams;
    use super::*;
    use chrono::{TimeZone, Utc};
    use qy_core::{PrefixCase, RetrievalError, TimeWindow};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        oracle: Arc<FixedOracle>,
        shard: Arc<ScriptedShard>,
        service: SuggestService,
    }

    fn fixture_with(readable: &[&str], shard: ScriptedShard, timeout: Duration) -> Fixture {
        let oracle = Arc::new(FixedOracle::new(readable));
        let shard = Arc::new(shard);
        let service = SuggestService::new(
            AccessScopeResolver::new(oracle.clone(), UnreadableStreams::Drop),
            TimeWindowResolver::default(),
            SuggestionEngine::new(
                vec![shard.clone() as Arc<dyn IndexShard>],
                PrefixCase::Sensitive,
                timeout,
            ),
            20,
            100,
        );
        Fixture {
            oracle,
            shard,
            service,
        }
    }

    fn fixture(readable: &[&str], pairs: &[(&str, u64)]) -> Fixture {
        fixture_with(
            readable,
            ScriptedShard::answering("shard-0", pairs),
            Duration::from_secs(5),
        )
    }

    fn caller() -> Identity {
        Identity::new("key-test", vec![])
    }

    #[tokio::test]
    async fn test_scenario_default_scope_and_window() {
        let f = fixture(&["s1", "s2"], &[("a", 5), ("b", 5), ("c", 3)]);
        let response = f
            .service
            .suggest(&caller(), SuggestRequest::new("host"))
            .await
            .unwrap();

        let got: Vec<(&str, u64)> = response
            .suggestions
            .iter()
            .map(|c| (c.value.as_str(), c.occurrence))
            .collect();
        assert_eq!(got, vec![("a", 5), ("b", 5), ("c", 3)]);
        assert_eq!(f.oracle.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.shard.calls(), 1);
    }

    #[tokio::test]
    async fn test_scenario_unreadable_stream_gives_empty_result() {
        let f = fixture(&["s1", "s2"], &[("web-01", 7)]);
        let request = SuggestRequest::new("host")
            .with_input("web")
            .with_streams(["s3"]);
        let response = f.service.suggest(&caller(), request).await.unwrap();

        assert!(response.suggestions.is_empty());
        assert_eq!(response.input, "web");
        assert_eq!(f.shard.calls(), 0);
    }

    #[tokio::test]
    async fn test_scenario_malformed_window_rejected_before_any_call() {
        let f = fixture(&["s1"], &[("a", 1)]);
        let from = Utc.timestamp_opt(2_000, 0).unwrap();
        let to = Utc.timestamp_opt(1_000, 0).unwrap();
        let request = SuggestRequest::new("host").with_timerange(TimeWindow::absolute(from, to));

        let err = f.service.suggest(&caller(), request).await.unwrap_err();
        assert!(matches!(err, SuggestError::MalformedRequest(_)));
        assert_eq!(f.shard.calls(), 0);
        assert_eq!(f.oracle.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_index_timeout_surfaces_retrieval_failure() {
        let f = fixture_with(
            &["s1"],
            ScriptedShard::slow("shard-0", Duration::from_secs(30)),
            Duration::from_millis(500),
        );
        let err = f
            .service
            .suggest(&caller(), SuggestRequest::new("host"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SuggestError::RetrievalFailure(RetrievalError::Timeout(500))
        );
        assert_eq!(f.oracle.list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.shard.calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_field_rejected() {
        let f = fixture(&["s1"], &[("a", 1)]);
        let err = f
            .service
            .suggest(&caller(), SuggestRequest::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, SuggestError::MalformedRequest(_)));
        assert_eq!(f.shard.calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_requests_are_byte_identical() {
        let f = fixture(&["s1", "s2"], &[("b", 2), ("a", 2), ("c", 9), ("d", 1)]);
        let request = SuggestRequest::new("host").with_streams(["s1", "s2"]);

        let first = f.service.suggest(&caller(), request.clone()).await.unwrap();
        let second = f.service.suggest(&caller(), request).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_size_is_clamped() {
        let pairs: Vec<(String, u64)> = (0..300).map(|i| (format!("v{}", i), 1)).collect();
        let borrowed: Vec<(&str, u64)> = pairs.iter().map(|(v, c)| (v.as_str(), *c)).collect();
        let f = fixture(&["s1"], &borrowed);

        let default = f
            .service
            .suggest(&caller(), SuggestRequest::new("host"))
            .await
            .unwrap();
        assert_eq!(default.suggestions.len(), 20);
        assert_eq!(default.sum_other_occurrences, 280);

        let large = f
            .service
            .suggest(&caller(), SuggestRequest::new("host").with_size(1_000))
            .await
            .unwrap();
        assert_eq!(large.suggestions.len(), 100);

        let small = f
            .service
            .suggest(&caller(), SuggestRequest::new("host").with_size(3))
            .await
            .unwrap();
        assert_eq!(small.suggestions.len(), 3);
    }
}
