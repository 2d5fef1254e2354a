//! A fixed pool of game loops: round-robin dispatch, scatter-gather
//! selection, and aggregate lifecycle.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::gameloop::{GameLoop, LoopContext, PendingTask, TaskHandle};
use crate::types::{Error, Result};

/// An ordered, fixed-length pool of [`GameLoop`]s.
///
/// Plain submissions are load-balanced round-robin; the `select` family
/// broadcasts to every loop and gathers, tolerating per-loop failure. The
/// round-robin cursor is the only state shared across callers, advanced
/// with a single atomic increment.
pub struct GameLoopGroup {
    id: String,
    loops: Vec<GameLoop>,
    cursor: AtomicUsize,
}

impl GameLoopGroup {
    /// A pool with one loop per available CPU.
    pub fn new(id: impl Into<String>) -> Self {
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_loop_count(id, count)
    }

    /// A pool of `count` loops named `"<id>-<index>"`, indexed from 1.
    pub fn with_loop_count(id: impl Into<String>, count: usize) -> Self {
        let id = id.into();
        let loops = (1..=count)
            .map(|index| GameLoop::new(format!("{id}-{index}")))
            .collect();
        Self::from_loops(id, loops)
    }

    /// Wrap existing loops; their order here is the group order.
    pub fn from_loops(id: impl Into<String>, loops: Vec<GameLoop>) -> Self {
        assert!(!loops.is_empty(), "a loop group needs at least one loop");
        let id = id.into();
        info!(group = %id, loops = loops.len(), "game loop group ready");
        Self {
            id,
            loops,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Lock-free round robin: every window of `len` consecutive calls
    /// visits each loop exactly once, in a fixed cyclic order.
    pub fn select_next(&self) -> &GameLoop {
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.loops[n % self.loops.len()]
    }

    /// Snapshot of all member loops, in construction order.
    pub fn select_all(&self) -> Vec<GameLoop> {
        self.loops.to_vec()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Load-balanced submission
    // ─────────────────────────────────────────────────────────────────────

    /// Submit to the next loop in round-robin order.
    pub fn submit<F, R>(&self, f: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce(&mut LoopContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.select_next().submit(f)
    }

    /// Fire-and-forget submission to the next loop.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut LoopContext) + Send + 'static,
    {
        self.select_next().execute(f)
    }

    /// Submit a batch to one loop (the next in round-robin order), so the
    /// tasks run in batch order relative to each other.
    pub fn invoke_all<F, R>(&self, tasks: Vec<F>) -> Result<Vec<TaskHandle<R>>>
    where
        F: FnOnce(&mut LoopContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let target = self.select_next();
        tasks.into_iter().map(|f| target.submit(f)).collect()
    }

    /// Submit a batch to one loop and return the first result that
    /// completes successfully.
    pub async fn invoke_any<F, R>(&self, tasks: Vec<F>) -> Result<R>
    where
        F: FnOnce(&mut LoopContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        if tasks.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let handles = self.invoke_all(tasks)?;
        let mut last_error = Error::EmptyBatch;
        for handle in handles {
            match handle.await {
                Ok(value) => return Ok(value),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scatter-gather selection
    // ─────────────────────────────────────────────────────────────────────

    /// Evaluate `predicate` on every loop's own thread and return the
    /// loops where it held, in construction order.
    ///
    /// A loop whose evaluation fails (panic, rejection) is logged and
    /// excluded; the query still succeeds with the partial result.
    pub async fn select<P>(&self, predicate: P) -> Vec<GameLoop>
    where
        P: Fn(&mut LoopContext) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        let outcomes = self.scatter(move |ctx| (*predicate)(ctx)).await;

        let mut selected = Vec::new();
        for (game_loop, outcome) in self.loops.iter().zip(outcomes) {
            match outcome {
                Ok(true) => selected.push(game_loop.clone()),
                Ok(false) => {}
                Err(e) => warn!(
                    group = %self.id,
                    game_loop = game_loop.name(),
                    error = %e,
                    "loop excluded from selection"
                ),
            }
        }
        selected
    }

    /// Evaluate `chooser` on every loop's own thread, rank the surviving
    /// loops ascending by `compare` over the chosen keys, and return the
    /// first `limit` (all survivors if `limit` exceeds the count).
    ///
    /// The sort is stable: loops with equal keys keep construction order.
    /// Failing loops are logged and excluded, as in [`Self::select`].
    pub async fn select_ranked<C, K, F>(
        &self,
        chooser: C,
        compare: F,
        limit: usize,
    ) -> Vec<GameLoop>
    where
        C: Fn(&mut LoopContext) -> K + Send + Sync + 'static,
        K: Send + 'static,
        F: Fn(&K, &K) -> CmpOrdering,
    {
        let chooser = Arc::new(chooser);
        let outcomes = self.scatter(move |ctx| (*chooser)(ctx)).await;

        let mut survivors: Vec<(K, GameLoop)> = Vec::new();
        for (game_loop, outcome) in self.loops.iter().zip(outcomes) {
            match outcome {
                Ok(key) => survivors.push((key, game_loop.clone())),
                Err(e) => warn!(
                    group = %self.id,
                    game_loop = game_loop.name(),
                    error = %e,
                    "loop excluded from ranking"
                ),
            }
        }

        survivors.sort_by(|a, b| compare(&a.0, &b.0));
        survivors.truncate(limit);
        survivors.into_iter().map(|(_, game_loop)| game_loop).collect()
    }

    /// Submit one closure to every loop and join all results, preserving
    /// loop order. Bounded fan-out: the wait is dominated by the slowest
    /// responding loop.
    async fn scatter<G, R>(&self, evaluate: G) -> Vec<Result<R>>
    where
        G: Fn(&mut LoopContext) -> R + Clone + Send + 'static,
        R: Send + 'static,
    {
        let submissions: Vec<Result<TaskHandle<R>>> = self
            .loops
            .iter()
            .map(|game_loop| {
                let evaluate = evaluate.clone();
                game_loop.submit(move |ctx| evaluate(ctx))
            })
            .collect();

        join_all(submissions.into_iter().map(|submitted| async move {
            match submitted {
                Ok(handle) => handle.await,
                Err(e) => Err(e),
            }
        }))
        .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Aggregate lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Initiate graceful shutdown on every member loop.
    pub fn shutdown(&self) {
        for game_loop in &self.loops {
            game_loop.shutdown();
        }
    }

    /// Immediate shutdown on every member loop; the never-started tasks of
    /// all members, flattened.
    pub fn shutdown_now(&self) -> Vec<PendingTask> {
        self.loops
            .iter()
            .flat_map(|game_loop| game_loop.shutdown_now())
            .collect()
    }

    /// True only if every member loop has begun shutting down.
    pub fn is_shutdown(&self) -> bool {
        self.loops.iter().all(GameLoop::is_shutdown)
    }

    /// True only if every member loop has fully terminated.
    pub fn is_terminated(&self) -> bool {
        self.loops.iter().all(GameLoop::is_terminated)
    }

    /// Wait on every loop in parallel, each bounded by `timeout`; true
    /// only if all of them terminated within the window.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        let waits = self
            .loops
            .iter()
            .map(|game_loop| game_loop.await_termination(timeout));
        join_all(waits).await.into_iter().all(|terminated| terminated)
    }
}

impl fmt::Debug for GameLoopGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameLoopGroup")
            .field("id", &self.id)
            .field("loops", &self.loops.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, Entity};
    use dashmap::DashMap;
    use std::collections::HashSet;
    use std::time::Instant;

    fn names_of(loops: &[GameLoop]) -> Vec<String> {
        loops.iter().map(|l| l.name().to_string()).collect()
    }

    async fn seed(group: &GameLoopGroup, index: usize, entities: usize) {
        let loops = group.select_all();
        for n in 0..entities {
            let entity = Entity::new(format!("seed-{index}-{n}"));
            let registered = loops[index]
                .submit(move |ctx| ctx.entities_mut().register(entity))
                .unwrap()
                .await
                .unwrap();
            assert!(registered);
        }
    }

    #[test]
    fn test_select_next_visits_loops_cyclically() {
        let group = GameLoopGroup::with_loop_count("rr", 4);
        assert_eq!(group.select_next().name(), "rr-1");

        let ids: Vec<_> = (0..40).map(|_| group.select_next().id()).collect();
        for pair in ids.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        for window in ids.windows(4) {
            assert_eq!(window.iter().collect::<HashSet<_>>().len(), 4);
        }
        // The order is a fixed cycle, not merely distinct.
        for i in 0..ids.len() - 4 {
            assert_eq!(ids[i], ids[i + 4]);
        }
        group.shutdown();
    }

    #[test]
    fn test_select_all_keeps_construction_order() {
        let group = GameLoopGroup::with_loop_count("order", 3);
        assert_eq!(names_of(&group.select_all()), ["order-1", "order-2", "order-3"]);
        assert_eq!(group.len(), 3);
        group.shutdown();
    }

    #[test]
    fn test_default_pool_uses_host_parallelism() {
        let group = GameLoopGroup::new("auto");
        assert!(group.len() >= 1);
        group.shutdown();
    }

    #[tokio::test]
    async fn test_group_submit_round_robins() {
        let group = GameLoopGroup::with_loop_count("lb", 4);
        let mut names = HashSet::new();
        for _ in 0..4 {
            let name = group
                .submit(|ctx| ctx.name().to_string())
                .unwrap()
                .await
                .unwrap();
            names.insert(name);
        }
        assert_eq!(names.len(), 4);
        group.shutdown();
    }

    #[tokio::test]
    async fn test_select_filters_in_construction_order() {
        let group = GameLoopGroup::with_loop_count("filter", 4);
        seed(&group, 0, 1).await;
        seed(&group, 2, 1).await;

        let populated = group.select(|ctx| ctx.entities().entity_count() > 0).await;
        assert_eq!(names_of(&populated), ["filter-1", "filter-3"]);
        group.shutdown();
    }

    #[tokio::test]
    async fn test_select_excludes_faulty_loops() {
        let group = GameLoopGroup::with_loop_count("faulty", 4);
        let matched = group
            .select(|ctx| {
                if ctx.name().ends_with("-2") {
                    panic!("selection failure");
                }
                true
            })
            .await;
        assert_eq!(names_of(&matched), ["faulty-1", "faulty-3", "faulty-4"]);
        group.shutdown();
    }

    #[tokio::test]
    async fn test_select_ranked_orders_and_limits() {
        let group = GameLoopGroup::with_loop_count("rank", 4);
        for (index, count) in [(1, 1), (2, 2), (3, 3)] {
            seed(&group, index, count).await;
        }

        // Busiest first, capped below the survivor count.
        let busiest = group
            .select_ranked(|ctx| ctx.entities().entity_count(), |a, b| b.cmp(a), 2)
            .await;
        assert_eq!(names_of(&busiest), ["rank-4", "rank-3"]);

        // A limit beyond the survivor count returns everything.
        let all = group
            .select_ranked(|ctx| ctx.entities().entity_count(), |a, b| a.cmp(b), 10)
            .await;
        assert_eq!(names_of(&all), ["rank-1", "rank-2", "rank-3", "rank-4"]);
        group.shutdown();
    }

    #[tokio::test]
    async fn test_select_ranked_breaks_ties_by_construction_order() {
        let group = GameLoopGroup::with_loop_count("ties", 4);
        let ranked = group
            .select_ranked(|ctx| ctx.entities().entity_count(), |a, b| a.cmp(b), 3)
            .await;
        assert_eq!(names_of(&ranked), ["ties-1", "ties-2", "ties-3"]);
        group.shutdown();
    }

    #[tokio::test]
    async fn test_invoke_all_shares_one_loop() {
        let group = GameLoopGroup::with_loop_count("batch", 4);
        let tasks: Vec<_> = (0..3)
            .map(|_| |ctx: &mut LoopContext| ctx.name().to_string())
            .collect();

        let handles = group.invoke_all(tasks).unwrap();
        let mut names = HashSet::new();
        for handle in handles {
            names.insert(handle.await.unwrap());
        }
        assert_eq!(names.len(), 1);
        group.shutdown();
    }

    #[tokio::test]
    async fn test_invoke_any_skips_failures() {
        let group = GameLoopGroup::with_loop_count("any", 2);
        let tasks: Vec<_> = (0..3)
            .map(|i| {
                move |_ctx: &mut LoopContext| {
                    if i == 0 {
                        panic!("first option failed");
                    }
                    i
                }
            })
            .collect();
        assert_eq!(group.invoke_any(tasks).await.unwrap(), 1);

        let empty: Vec<fn(&mut LoopContext) -> i32> = Vec::new();
        assert!(matches!(
            group.invoke_any(empty).await,
            Err(Error::EmptyBatch)
        ));
        group.shutdown();
    }

    #[tokio::test]
    async fn test_aggregate_lifecycle() {
        let group = GameLoopGroup::with_loop_count("life", 3);
        assert!(!group.is_shutdown());

        // One loop down is not the group down.
        group.select_all()[0].shutdown();
        assert!(!group.is_shutdown());

        group.shutdown();
        assert!(group.is_shutdown());
        assert!(group.await_termination(Duration::from_secs(5)).await);
        assert!(group.is_terminated());
    }

    #[test]
    fn test_group_shutdown_now_flattens_reclaimed() {
        let group = GameLoopGroup::with_loop_count("now", 2);

        // Park both workers so follow-up submissions stay queued.
        let started = Arc::new(AtomicUsize::new(0));
        for game_loop in group.select_all() {
            let started = Arc::clone(&started);
            game_loop
                .submit(move |_ctx| {
                    started.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(50));
                })
                .unwrap();
        }
        while started.load(Ordering::SeqCst) < 2 {
            std::thread::sleep(Duration::from_millis(1));
        }

        let _q1 = group.submit(|_ctx| ()).unwrap();
        let _q2 = group.submit(|_ctx| ()).unwrap();
        assert_eq!(group.shutdown_now().len(), 2);
    }

    struct FirstTickSignal {
        signals: Arc<DashMap<String, ()>>,
        owner: Option<String>,
        fired: bool,
    }

    impl Component for FirstTickSignal {
        fn on_attach(&mut self, owner: &str) {
            self.owner = Some(owner.to_string());
        }

        fn tick(&mut self, _elapse: Duration) {
            if !self.fired {
                if let Some(owner) = &self.owner {
                    self.signals.insert(owner.clone(), ());
                }
                self.fired = true;
            }
        }
    }

    #[tokio::test]
    async fn test_end_to_end_tick_and_drain() {
        const ENTITY_COUNT: usize = 10_000;
        let group = GameLoopGroup::with_loop_count("bench", 4);
        for game_loop in group.select_all() {
            assert!(game_loop.run(Duration::ZERO, Duration::from_millis(10)));
        }

        let signals: Arc<DashMap<String, ()>> = Arc::new(DashMap::with_capacity(ENTITY_COUNT));
        let mut registrations = Vec::with_capacity(ENTITY_COUNT);
        for _ in 0..ENTITY_COUNT {
            let mut entity = Entity::new(uuid::Uuid::new_v4().to_string());
            entity.add_component(FirstTickSignal {
                signals: Arc::clone(&signals),
                owner: None,
                fired: false,
            });
            registrations.push(
                group
                    .select_next()
                    .submit(move |ctx| ctx.entities_mut().register(entity))
                    .unwrap(),
            );
        }
        for registered in join_all(registrations).await {
            assert!(registered.unwrap());
        }

        let deadline = Instant::now() + Duration::from_millis(150);
        while signals.len() < ENTITY_COUNT {
            assert!(
                Instant::now() < deadline,
                "only {} of {ENTITY_COUNT} entities ticked in time",
                signals.len()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        group.shutdown();
        assert!(group.await_termination(Duration::from_secs(10)).await);
        assert!(group.is_terminated());
    }
}
