//! Scheduler & Work-Item runtime (§4.1, §5).
//!
//! Grounded in the teacher's `pipeline.rs` dispatch shape: an `Arc<Self>`
//! scheduler owning a `tokio::spawn`-per-item loop, with a bounded admission
//! set and non-poisoning failure handling.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::BridgeError;

/// A runnable unit of work produced by a bot's `produce_periodic_items`.
#[async_trait::async_trait]
pub trait WorkItem: Send + Sync {
    /// A short, stable label used in logs ("mail-bridge:openjdk/jdk#1234").
    fn label(&self) -> String;

    /// True if `self` and `other` may run at the same time. Must be
    /// symmetric: `a.may_run_concurrently_with(b) == b.may_run_concurrently_with(a)`
    /// is expected of well-behaved implementations, though the scheduler
    /// only ever calls it on the side about to be admitted.
    fn may_run_concurrently_with(&self, other: &dyn WorkItem) -> bool;

    /// Runs the item against a freshly allocated scratch path, returning
    /// zero or more follow-up items the scheduler should enqueue next.
    async fn execute(&self, scratch_path: &str) -> anyhow::Result<Vec<Box<dyn WorkItem>>>;

    /// Invoked when `execute` returns an error that isn't otherwise handled.
    /// Default: log it. Bots needing more (e.g. circuit-breaking a whole
    /// mailing list) can override this.
    async fn on_error(&self, err: &anyhow::Error) {
        warn!(item = %self.label(), error = %err, "work item failed");
    }
}

/// Hook each bot implements: produce work items on every scheduler tick.
/// A Fatal-class error from this hook means the bot declines to produce
/// items this cycle; other bots are unaffected (§7).
#[async_trait::async_trait]
pub trait Bot: Send + Sync {
    fn name(&self) -> &str;
    async fn produce_periodic_items(&self) -> Result<Vec<Box<dyn WorkItem>>, BridgeError>;
}

type ScratchFactory = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>> + Send + Sync>;

/// Runs bounded concurrent work items subject to pairwise mutual-exclusion.
pub struct Scheduler {
    bots: Mutex<Vec<Arc<dyn Bot>>>,
    running_labels: Mutex<Vec<Arc<dyn WorkItem>>>,
    max_concurrent: usize,
    scratch_factory: Option<ScratchFactory>,
}

impl Scheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            bots: Mutex::new(Vec::new()),
            running_labels: Mutex::new(Vec::new()),
            max_concurrent,
            scratch_factory: None,
        }
    }

    /// Override scratch-path allocation (tests substitute a tempdir).
    pub fn with_scratch_factory(mut self, factory: ScratchFactory) -> Self {
        self.scratch_factory = Some(factory);
        self
    }

    pub async fn register(&self, bot: Arc<dyn Bot>) {
        self.bots.lock().await.push(bot);
    }

    /// One scheduler tick: produce items from every bot, then drain the
    /// resulting queue honoring the admission predicate and concurrency cap.
    pub async fn tick(self: &Arc<Self>) -> anyhow::Result<TickReport> {
        let bots = self.bots.lock().await.clone();
        let mut queue: Vec<Arc<dyn WorkItem>> = Vec::new();
        let mut declined = Vec::new();

        for bot in &bots {
            match bot.produce_periodic_items().await {
                Ok(items) => queue.extend(items.into_iter().map(Arc::from)),
                Err(e) if e.class == crate::error::ErrorClass::Fatal => {
                    error!(bot = bot.name(), error = %e, "bot declined to produce items this cycle");
                    declined.push(bot.name().to_string());
                }
                Err(e) => {
                    warn!(bot = bot.name(), error = %e, "bot produce_periodic_items failed");
                }
            }
        }

        let dispatched = queue.len();
        let mut handles = Vec::new();
        while let Some(item) = self.admit_next(&mut queue).await {
            let scheduler = Arc::clone(self);
            let item_clone = Arc::clone(&item);
            handles.push(tokio::spawn(async move {
                scheduler.run_one(item_clone).await;
            }));
        }
        for h in handles {
            let _ = h.await;
        }

        Ok(TickReport { dispatched, declined_bots: declined })
    }

    /// Pop the next queued item whose predicate is compatible with every
    /// currently-running item, bounded by `max_concurrent`. Items that can't
    /// yet run stay queued for a later call within the same tick.
    async fn admit_next(&self, queue: &mut Vec<Arc<dyn WorkItem>>) -> Option<Arc<dyn WorkItem>> {
        let running = self.running_labels.lock().await;
        if running.len() >= self.max_concurrent {
            return None;
        }
        let idx = queue.iter().position(|candidate| {
            running
                .iter()
                .all(|r| candidate.may_run_concurrently_with(r.as_ref()))
        })?;
        drop(running);
        let item = queue.remove(idx);
        self.running_labels.lock().await.push(Arc::clone(&item));
        Some(item)
    }

    async fn run_one(self: Arc<Self>, item: Arc<dyn WorkItem>) {
        let scratch = match self.allocate_scratch().await {
            Ok(p) => p,
            Err(e) => {
                error!(item = %item.label(), error = %e, "failed to allocate scratch path");
                self.retire(&item).await;
                return;
            }
        };

        let result = item.execute(&scratch).await;
        self.cleanup_scratch(&scratch).await;

        match result {
            Ok(follow_ups) => {
                info!(item = %item.label(), follow_ups = follow_ups.len(), "work item completed");
            }
            Err(e) => {
                item.on_error(&e).await;
            }
        }
        self.retire(&item).await;
    }

    async fn retire(&self, item: &Arc<dyn WorkItem>) {
        let mut running = self.running_labels.lock().await;
        if let Some(pos) = running.iter().position(|r| Arc::ptr_eq(r, item)) {
            running.remove(pos);
        }
    }

    async fn allocate_scratch(&self) -> anyhow::Result<String> {
        if let Some(factory) = &self.scratch_factory {
            factory().await
        } else {
            let dir = std::env::temp_dir().join(format!("bridge-scratch-{}", uuid_like()));
            tokio::fs::create_dir_all(&dir).await?;
            Ok(dir.to_string_lossy().into_owned())
        }
    }

    async fn cleanup_scratch(&self, path: &str) {
        if let Err(e) = tokio::fs::remove_dir_all(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path, error = %e, "failed to clean up scratch path");
            }
        }
    }
}

fn uuid_like() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{nanos:x}")
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub dispatched: usize,
    pub declined_bots: Vec<String>,
}
