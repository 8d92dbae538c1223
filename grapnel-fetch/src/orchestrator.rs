//! Multi-strategy orchestration.
//!
//! Single-item resolution runs strategies strictly in priority order and
//! stops at the first success. Search treats strategies as complementary:
//! every successful partial page is merged in priority order, deduplicated
//! by item id and capped at the requested limit.
//!
//! Every attempt is isolated. Errors, panics and timeouts become a failed
//! [`StrategyResult`] and the next strategy still runs; neither entry point
//! returns an error or panics.

use futures::FutureExt;
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use grapnel_core::{Item, ItemRef, SearchPage, SearchQuery};

use crate::context::FetchContext;
use crate::error::{FetchError, panic_message};
use crate::retry::RetryPolicy;
use crate::strategy::{AcquisitionStrategy, StrategyInfo, StrategyKind};

// ============================================================================
// Strategy Result
// ============================================================================

/// Immutable record of one strategy attempt.
#[derive(Debug, Clone)]
pub struct StrategyResult<T> {
    /// The strategy that was attempted.
    pub strategy_id: String,
    /// Its mechanism.
    pub kind: StrategyKind,
    /// Whether it produced a payload.
    pub success: bool,
    /// The payload on success.
    pub payload: Option<T>,
    /// The error on failure.
    pub error: Option<FetchError>,
    /// Wall time spent on the attempt.
    pub latency: Duration,
    /// Calls made inside the attempt (0 when skipped).
    pub tries: u32,
}

impl<T> StrategyResult<T> {
    fn success(id: &str, kind: StrategyKind, payload: T, latency: Duration, tries: u32) -> Self {
        Self {
            strategy_id: id.to_string(),
            kind,
            success: true,
            payload: Some(payload),
            error: None,
            latency,
            tries,
        }
    }

    fn failure(id: &str, kind: StrategyKind, error: FetchError, latency: Duration, tries: u32) -> Self {
        Self {
            strategy_id: id.to_string(),
            kind,
            success: false,
            payload: None,
            error: Some(error),
            latency,
            tries,
        }
    }

    /// Returns true if the strategy was skipped as unavailable.
    pub fn was_skipped(&self) -> bool {
        matches!(self.error, Some(FetchError::NotAvailable(_)))
    }
}

// ============================================================================
// Outcomes
// ============================================================================

fn last_error<T>(attempts: &[StrategyResult<T>]) -> Option<&FetchError> {
    attempts.iter().rev().find_map(|a| a.error.as_ref())
}

fn aggregate_failure<T>(attempts: &[StrategyResult<T>], elapsed: Duration) -> FetchError {
    if attempts.is_empty() {
        return FetchError::NoStrategies;
    }
    FetchError::AllStrategiesFailed {
        last_error: last_error(attempts).cloned().map(Box::new),
        elapsed,
    }
}

/// The outcome of a single-item resolution.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    /// Every attempt, in the order made.
    pub attempts: Vec<StrategyResult<Item>>,
    /// Total time.
    pub elapsed: Duration,
}

impl ResolveOutcome {
    fn winner(&self) -> Option<&StrategyResult<Item>> {
        self.attempts.iter().find(|a| a.success)
    }

    /// Returns true if some strategy succeeded.
    pub fn is_success(&self) -> bool {
        self.winner().is_some()
    }

    /// The resolved item.
    pub fn item(&self) -> Option<&Item> {
        self.winner().and_then(|a| a.payload.as_ref())
    }

    /// The strategy that succeeded.
    pub fn strategy(&self) -> Option<&str> {
        self.winner().map(|a| a.strategy_id.as_str())
    }

    /// The error of the last failed attempt.
    pub fn last_error(&self) -> Option<&FetchError> {
        last_error(&self.attempts)
    }

    /// Number of strategies tried (skipped ones included).
    pub fn attempts_count(&self) -> usize {
        self.attempts.len()
    }

    /// Converts into the item or the aggregate failure.
    ///
    /// # Errors
    ///
    /// [`FetchError::NoStrategies`] if nothing ran, otherwise
    /// [`FetchError::AllStrategiesFailed`] carrying the last error.
    pub fn into_result(self) -> Result<Item, FetchError> {
        let elapsed = self.elapsed;
        let failure = aggregate_failure(&self.attempts, elapsed);
        self.attempts
            .into_iter()
            .find(|a| a.success)
            .and_then(|a| a.payload)
            .ok_or(failure)
    }
}

/// The outcome of a search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Merged items, deduplicated, in strategy priority order.
    pub items: Vec<Item>,
    /// Strategies that added at least one item, in priority order.
    pub contributors: Vec<String>,
    /// Whether more results likely exist.
    pub has_more: bool,
    /// Every attempt, in priority order.
    pub attempts: Vec<StrategyResult<SearchPage>>,
    /// Total time.
    pub elapsed: Duration,
}

impl SearchOutcome {
    /// Returns true if at least one strategy succeeded.
    pub fn is_success(&self) -> bool {
        self.attempts.iter().any(|a| a.success)
    }

    /// The error of the last failed attempt.
    pub fn last_error(&self) -> Option<&FetchError> {
        last_error(&self.attempts)
    }

    /// The aggregate failure when no strategy succeeded.
    pub fn failure(&self) -> Option<FetchError> {
        (!self.is_success()).then(|| aggregate_failure(&self.attempts, self.elapsed))
    }

    /// Converts into the merged page or the aggregate failure.
    ///
    /// # Errors
    ///
    /// Returns the aggregate failure when no strategy succeeded.
    pub fn into_result(self) -> Result<SearchPage, FetchError> {
        match self.failure() {
            Some(err) => Err(err),
            None => Ok(SearchPage::new(self.items, self.has_more)),
        }
    }
}

/// Accumulates partial pages in priority order.
struct Merger {
    limit: usize,
    seen: HashSet<String>,
    items: Vec<Item>,
    contributors: Vec<String>,
    has_more: bool,
}

impl Merger {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            seen: HashSet::new(),
            items: Vec::new(),
            contributors: Vec::new(),
            has_more: false,
        }
    }

    fn absorb(&mut self, result: &StrategyResult<SearchPage>) {
        let Some(page) = result.payload.as_ref() else {
            return;
        };

        self.has_more |= page.has_more;
        let mut added = 0;
        for item in &page.items {
            if self.seen.contains(&item.id) {
                continue;
            }
            if self.items.len() >= self.limit {
                self.has_more = true;
                break;
            }
            self.seen.insert(item.id.clone());
            self.items.push(item.clone());
            added += 1;
        }

        if added > 0 {
            self.contributors.push(result.strategy_id.clone());
        }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs strategies for one logical operation.
pub struct Orchestrator {
    strategies: Vec<Box<dyn AcquisitionStrategy>>,
}

impl Orchestrator {
    /// Creates an empty orchestrator.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Creates an orchestrator with the given strategies.
    pub fn with_strategies(strategies: Vec<Box<dyn AcquisitionStrategy>>) -> Self {
        let mut orchestrator = Self { strategies };
        orchestrator.sort_by_priority();
        orchestrator
    }

    /// Adds a strategy.
    pub fn add_strategy(&mut self, strategy: Box<dyn AcquisitionStrategy>) {
        self.strategies.push(strategy);
        self.sort_by_priority();
    }

    /// Stable sort, highest priority first. Ties keep insertion order.
    fn sort_by_priority(&mut self) {
        self.strategies.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Returns the number of strategies.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if there are no strategies.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy ids in execution order.
    pub fn strategy_ids(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.id()).collect()
    }

    /// Returns information about all strategies.
    pub async fn strategy_info(&self, ctx: &FetchContext) -> Vec<StrategyInfo> {
        let mut info = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            info.push(StrategyInfo::from_strategy(strategy.as_ref(), ctx).await);
        }
        info
    }

    /// Runs one isolated attempt: availability, bounded retry of transient
    /// failures, time budget, panic capture.
    async fn attempt<T, F, Fut>(
        strategy: &dyn AcquisitionStrategy,
        ctx: &FetchContext,
        mut op: F,
    ) -> StrategyResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let id = strategy.id();
        let kind = strategy.kind();
        let start = Instant::now();

        let available = AssertUnwindSafe(strategy.is_available(ctx))
            .catch_unwind()
            .await
            .unwrap_or(false);
        if !available {
            debug!(strategy = %id, "Strategy not available, skipping");
            return StrategyResult::failure(
                id,
                kind,
                FetchError::NotAvailable(id.to_string()),
                Duration::ZERO,
                0,
            );
        }

        let budget = strategy.timeout();
        let policy = RetryPolicy::new(1 + strategy.retries())
            .with_base_delay(ctx.settings.retry_base_delay)
            .with_max_delay(budget);
        let tries = AtomicU32::new(0);

        let run = policy.run(
            |_| {
                tries.fetch_add(1, Ordering::Relaxed);
                op()
            },
            FetchError::is_transient,
        );

        let result = match tokio::time::timeout(budget, AssertUnwindSafe(run).catch_unwind()).await {
            Ok(Ok(outcome)) => outcome.result,
            Ok(Err(panic)) => Err(FetchError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(FetchError::Timeout(budget)),
        };

        let latency = start.elapsed();
        let tries = tries.load(Ordering::Relaxed);
        match result {
            Ok(payload) => {
                info!(strategy = %id, duration = ?latency, tries, "Strategy succeeded");
                StrategyResult::success(id, kind, payload, latency, tries)
            }
            Err(error) => {
                warn!(
                    strategy = %id,
                    error = %error,
                    action = %error.action(),
                    duration = ?latency,
                    "Strategy failed"
                );
                StrategyResult::failure(id, kind, error, latency, tries)
            }
        }
    }

    /// Resolves one item, trying strategies in priority order until one succeeds.
    #[instrument(skip(self, ctx, target), fields(item = %target, strategies = self.strategies.len()))]
    pub async fn resolve(&self, ctx: &FetchContext, target: &ItemRef) -> ResolveOutcome {
        let start = Instant::now();
        let mut attempts = Vec::new();

        for strategy in &self.strategies {
            let strategy = strategy.as_ref();
            let result = Self::attempt(strategy, ctx, || strategy.resolve(ctx, target)).await;
            let done = result.success;
            attempts.push(result);
            if done {
                break;
            }
        }

        let outcome = ResolveOutcome {
            attempts,
            elapsed: start.elapsed(),
        };
        if !outcome.is_success() {
            warn!(attempts = outcome.attempts_count(), "All strategies failed");
        }
        outcome
    }

    /// Searches by keyword across every search-capable strategy.
    #[instrument(skip(self, ctx, query), fields(keyword = %query.keyword, limit = query.limit))]
    pub async fn search(&self, ctx: &FetchContext, query: &SearchQuery) -> SearchOutcome {
        let start = Instant::now();
        let mut merger = Merger::new(query.limit);
        let searchable: Vec<&dyn AcquisitionStrategy> = self
            .strategies
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| s.supports_search())
            .collect();

        let mut attempts = Vec::new();
        if query.limit > 0 {
            if ctx.settings.concurrent_search {
                // join_all keeps input order, so merging stays in priority order.
                attempts = join_all(searchable.iter().map(|&s| {
                    Self::attempt(s, ctx, move || s.search(ctx, query))
                }))
                .await;
                for result in &attempts {
                    merger.absorb(result);
                }
            } else {
                for &strategy in &searchable {
                    let result =
                        Self::attempt(strategy, ctx, || strategy.search(ctx, query)).await;
                    merger.absorb(&result);
                    attempts.push(result);
                    if merger.is_full() {
                        debug!(strategy = %strategy.id(), "Search limit reached");
                        break;
                    }
                }
            }
        }

        info!(
            items = merger.items.len(),
            contributors = merger.contributors.len(),
            "Search finished"
        );
        SearchOutcome {
            items: merger.items,
            contributors: merger.contributors,
            has_more: merger.has_more,
            attempts,
            elapsed: start.elapsed(),
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("strategies", &self.strategy_ids())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FetchSettings;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Clone)]
    enum Behavior {
        Succeed(Vec<&'static str>),
        SucceedWithMore(Vec<&'static str>),
        Fail(FetchError),
        FlakyThenSucceed(u32),
        Hang,
        Panic,
    }

    struct MockStrategy {
        id: String,
        priority: u32,
        available: bool,
        retries: u32,
        delay: Duration,
        behavior: Behavior,
        calls: Arc<AtomicU32>,
    }

    impl MockStrategy {
        fn new(id: &str, priority: u32, behavior: Behavior) -> Self {
            Self {
                id: id.to_string(),
                priority,
                available: true,
                retries: 0,
                delay: Duration::ZERO,
                behavior,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }

        fn with_retries(mut self, retries: u32) -> Self {
            self.retries = retries;
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Arc<AtomicU32> {
            Arc::clone(&self.calls)
        }

        async fn run(&self) -> Result<Vec<Item>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            let ids = match &self.behavior {
                Behavior::Succeed(ids) | Behavior::SucceedWithMore(ids) => ids.clone(),
                Behavior::Fail(err) => return Err(err.clone()),
                Behavior::FlakyThenSucceed(failures) => {
                    if call <= *failures {
                        return Err(FetchError::Transport(TransportError::Connect(
                            "reset".to_string(),
                        )));
                    }
                    vec!["flaky"]
                }
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Vec::new()
                }
                Behavior::Panic => panic!("strategy exploded"),
            };
            Ok(ids
                .into_iter()
                .map(|id| {
                    let mut item = Item::new(id);
                    item.source = Some(self.id.clone());
                    item
                })
                .collect())
        }
    }

    #[async_trait]
    impl AcquisitionStrategy for MockStrategy {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> StrategyKind {
            StrategyKind::PublicEmbed
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }

        fn retries(&self) -> u32 {
            self.retries
        }

        fn supports_search(&self) -> bool {
            true
        }

        async fn is_available(&self, _ctx: &FetchContext) -> bool {
            self.available
        }

        async fn resolve(&self, _ctx: &FetchContext, _target: &ItemRef) -> Result<Item, FetchError> {
            let mut items = self.run().await?;
            items
                .pop()
                .ok_or_else(|| FetchError::EmptyResponse(self.id.clone()))
        }

        async fn search(
            &self,
            _ctx: &FetchContext,
            _query: &SearchQuery,
        ) -> Result<SearchPage, FetchError> {
            let items = self.run().await?;
            let more = matches!(self.behavior, Behavior::SucceedWithMore(_));
            Ok(SearchPage::new(items, more))
        }
    }

    fn ctx() -> FetchContext {
        FetchContext::builder()
            .settings(FetchSettings::default().with_retry_base_delay(Duration::from_millis(10)))
            .build()
            .unwrap()
    }

    fn sequential_ctx() -> FetchContext {
        FetchContext::builder()
            .settings(FetchSettings::default().sequential())
            .build()
            .unwrap()
    }

    fn target() -> ItemRef {
        ItemRef::parse("CODE123").unwrap()
    }

    fn parse_error() -> FetchError {
        FetchError::Parse("bad body".to_string())
    }

    fn ids(items: &[Item]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_sorted_by_priority() {
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(MockStrategy::new("low", 10, Behavior::Hang)),
            Box::new(MockStrategy::new("high", 90, Behavior::Hang)),
            Box::new(MockStrategy::new("mid", 50, Behavior::Hang)),
            Box::new(MockStrategy::new("mid.second", 50, Behavior::Hang)),
        ]);

        assert_eq!(
            orchestrator.strategy_ids(),
            vec!["high", "mid", "mid.second", "low"]
        );
    }

    #[tokio::test]
    async fn test_empty_orchestrator() {
        let outcome = Orchestrator::new().resolve(&ctx(), &target()).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts_count(), 0);
        assert!(matches!(outcome.into_result(), Err(FetchError::NoStrategies)));
    }

    #[tokio::test]
    async fn test_first_success_stops_resolution() {
        let a = MockStrategy::new("a", 100, Behavior::Succeed(vec!["1"]));
        let b = MockStrategy::new("b", 80, Behavior::Succeed(vec!["2"]));
        let c = MockStrategy::new("c", 60, Behavior::Succeed(vec!["3"]));
        let (b_calls, c_calls) = (b.calls(), c.calls());
        let orchestrator =
            Orchestrator::with_strategies(vec![Box::new(c), Box::new(b), Box::new(a)]);

        let outcome = orchestrator.resolve(&ctx(), &target()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.strategy(), Some("a"));
        assert_eq!(outcome.attempts_count(), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_falls_through() {
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(MockStrategy::new("a", 100, Behavior::Fail(parse_error()))),
            Box::new(MockStrategy::new("b", 50, Behavior::Succeed(vec!["2"]))),
        ]);

        let outcome = orchestrator.resolve(&ctx(), &target()).await;

        assert_eq!(outcome.strategy(), Some("b"));
        assert_eq!(outcome.attempts_count(), 2);
        assert!(matches!(outcome.attempts[0].error, Some(FetchError::Parse(_))));
        assert_eq!(outcome.item().map(|i| i.id.as_str()), Some("2"));
    }

    #[tokio::test]
    async fn test_skip_unavailable() {
        let skipped = MockStrategy::new("off", 100, Behavior::Succeed(vec!["1"])).unavailable();
        let skipped_calls = skipped.calls();
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(skipped),
            Box::new(MockStrategy::new("on", 50, Behavior::Succeed(vec!["2"]))),
        ]);

        let outcome = orchestrator.resolve(&ctx(), &target()).await;

        assert_eq!(outcome.strategy(), Some("on"));
        assert!(outcome.attempts[0].was_skipped());
        assert_eq!(outcome.attempts[0].tries, 0);
        assert_eq!(skipped_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_success() {
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(MockStrategy::new("slow", 100, Behavior::Hang)),
            Box::new(MockStrategy::new("fast", 50, Behavior::Succeed(vec!["2"]))),
        ]);

        let outcome = orchestrator.resolve(&ctx(), &target()).await;

        assert_eq!(outcome.strategy(), Some("fast"));
        assert!(matches!(
            outcome.attempts[0].error,
            Some(FetchError::Timeout(d)) if d == Duration::from_secs(5)
        ));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(MockStrategy::new("boom", 100, Behavior::Panic)),
            Box::new(MockStrategy::new("ok", 50, Behavior::Succeed(vec!["2"]))),
        ]);

        let outcome = orchestrator.resolve(&ctx(), &target()).await;

        assert_eq!(outcome.strategy(), Some("ok"));
        match &outcome.attempts[0].error {
            Some(FetchError::Panicked(msg)) => assert!(msg.contains("strategy exploded")),
            other => panic!("expected panic capture, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retried_within_attempt() {
        let flaky = MockStrategy::new("flaky", 100, Behavior::FlakyThenSucceed(2)).with_retries(2);
        let calls = flaky.calls();
        let orchestrator = Orchestrator::with_strategies(vec![Box::new(flaky)]);

        let outcome = orchestrator.resolve(&ctx(), &target()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts[0].tries, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_failure_not_retried() {
        let failing = MockStrategy::new("bad", 100, Behavior::Fail(parse_error())).with_retries(3);
        let calls = failing.calls();
        let orchestrator = Orchestrator::with_strategies(vec![Box::new(failing)]);

        let outcome = orchestrator.resolve(&ctx(), &target()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match outcome.into_result() {
            Err(FetchError::AllStrategiesFailed { last_error, .. }) => {
                assert!(matches!(last_error.as_deref(), Some(FetchError::Parse(_))));
            }
            other => panic!("expected aggregate failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_merges_in_priority_order() {
        // The high-priority strategy finishes last.
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(
                MockStrategy::new("high", 100, Behavior::Succeed(vec!["1", "2", "3"]))
                    .with_delay(Duration::from_secs(2)),
            ),
            Box::new(MockStrategy::new("low", 50, Behavior::Succeed(vec!["3", "4", "5"]))),
        ]);

        let outcome = orchestrator
            .search(&ctx(), &SearchQuery::new("rust", 10))
            .await;

        assert_eq!(ids(&outcome.items), vec!["1", "2", "3", "4", "5"]);
        assert_eq!(outcome.items[2].source.as_deref(), Some("high"));
        assert_eq!(outcome.contributors, vec!["high", "low"]);
        assert!(!outcome.has_more);
    }

    #[tokio::test]
    async fn test_search_caps_at_limit() {
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(MockStrategy::new("a", 100, Behavior::Succeed(vec!["1", "2"]))),
            Box::new(MockStrategy::new("b", 50, Behavior::Succeed(vec!["3", "4"]))),
        ]);

        let outcome = orchestrator
            .search(&ctx(), &SearchQuery::new("rust", 3))
            .await;

        assert_eq!(ids(&outcome.items), vec!["1", "2", "3"]);
        assert!(outcome.has_more);
    }

    #[tokio::test]
    async fn test_search_contributors_exclude_duplicate_only_pages() {
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(MockStrategy::new("a", 100, Behavior::Succeed(vec!["1", "2"]))),
            Box::new(MockStrategy::new("b", 50, Behavior::SucceedWithMore(vec!["2", "1"]))),
            Box::new(MockStrategy::new("c", 10, Behavior::Fail(parse_error()))),
        ]);

        let outcome = orchestrator
            .search(&ctx(), &SearchQuery::new("rust", 10))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.contributors, vec!["a"]);
        assert!(outcome.has_more);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.failure().is_none());
    }

    #[tokio::test]
    async fn test_search_zero_limit_runs_nothing() {
        let a = MockStrategy::new("a", 100, Behavior::Succeed(vec!["1"]));
        let calls = a.calls();
        let orchestrator = Orchestrator::with_strategies(vec![Box::new(a)]);

        let outcome = orchestrator
            .search(&ctx(), &SearchQuery::new("rust", 0))
            .await;

        assert!(outcome.items.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sequential_search_stops_when_full() {
        let b = MockStrategy::new("b", 50, Behavior::Succeed(vec!["3"]));
        let b_calls = b.calls();
        let orchestrator = Orchestrator::with_strategies(vec![
            Box::new(MockStrategy::new("a", 100, Behavior::Succeed(vec!["1", "2"]))),
            Box::new(b),
        ]);

        let outcome = orchestrator
            .search(&sequential_ctx(), &SearchQuery::new("rust", 2))
            .await;

        assert_eq!(ids(&outcome.items), vec!["1", "2"]);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_search_all_failed() {
        let orchestrator = Orchestrator::with_strategies(vec![Box::new(MockStrategy::new(
            "a",
            100,
            Behavior::Fail(FetchError::Auth {
                status: 401,
                endpoint: "/search".to_string(),
            }),
        ))]);

        let outcome = orchestrator
            .search(&ctx(), &SearchQuery::new("rust", 5))
            .await;

        assert!(!outcome.is_success());
        assert!(matches!(
            outcome.into_result(),
            Err(FetchError::AllStrategiesFailed { .. })
        ));
    }
}
