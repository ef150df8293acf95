//! Reactive recomputation of the canonical server list.
//!
//! The engine listens to registry changes, coalesces them through an explicit
//! [`RecomputeScheduler`], runs [`resolve_with_report`] and publishes a
//! [`ServersChanged`] diff whenever the result differs from the last one it
//! emitted. It runs on the thread that owns the registry; nothing here locks.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::aggregate::resolve_with_report;
use crate::model::{AggregatedEntry, EntryKey};
use crate::profiling::{RecomputeMetrics, Timer};
use crate::registry::{
    CollectionRegistry, RegistryChange, Subscribers, Subscription, SubscriptionId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Scheduled,
    Running {
        rerun: bool,
    },
}

/// At most one recompute is queued behind the one in flight.
#[derive(Debug, Clone, Default)]
pub struct RecomputeScheduler {
    state: SchedulerState,
}

impl RecomputeScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for a recompute. Returns `true` when the request was folded into
    /// one that is already queued.
    pub fn request(&mut self) -> bool {
        match self.state {
            SchedulerState::Idle => {
                self.state = SchedulerState::Scheduled;
                false
            },
            SchedulerState::Running { rerun: false } => {
                self.state = SchedulerState::Running { rerun: true };
                false
            },
            SchedulerState::Scheduled | SchedulerState::Running { rerun: true } => true,
        }
    }

    /// Starts the queued recompute, if there is one.
    pub fn begin(&mut self) -> bool {
        if self.state == SchedulerState::Scheduled {
            self.state = SchedulerState::Running { rerun: false };
            true
        } else {
            false
        }
    }

    /// Ends the running recompute, queueing the single follow-up run if one was requested.
    pub fn finish(&mut self) {
        self.state = match self.state {
            SchedulerState::Running { rerun: true } => SchedulerState::Scheduled,
            SchedulerState::Running { rerun: false } => SchedulerState::Idle,
            other => other,
        };
    }

    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.state == SchedulerState::Scheduled
    }
}

/// Difference between two canonical lists, keyed by `(id, sourceCollectionId)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDiff {
    pub added: Vec<AggregatedEntry>,
    pub removed: Vec<EntryKey>,
    pub updated: Vec<AggregatedEntry>,
}

impl EntryDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

#[must_use]
pub fn diff_entries(previous: &[AggregatedEntry], next: &[AggregatedEntry]) -> EntryDiff {
    let before: HashMap<EntryKey, &AggregatedEntry> =
        previous.iter().map(|e| (e.key(), e)).collect();
    let after: HashSet<EntryKey> = next.iter().map(AggregatedEntry::key).collect();

    let mut diff = EntryDiff::default();

    for entry in next {
        match before.get(&entry.key()) {
            None => diff.added.push(entry.clone()),
            Some(old) if *old != entry => diff.updated.push(entry.clone()),
            Some(_) => {},
        }
    }

    diff.removed =
        previous.iter().map(AggregatedEntry::key).filter(|key| !after.contains(key)).collect();

    diff
}

/// Published once per coalesced recompute whose result changed.
#[derive(Debug, Clone)]
pub struct ServersChanged {
    pub generation: u64,
    pub at: DateTime<Utc>,
    /// The full new canonical list.
    pub servers: Arc<[AggregatedEntry]>,
    pub added: Vec<AggregatedEntry>,
    pub removed: Vec<EntryKey>,
    pub updated: Vec<AggregatedEntry>,
}

#[derive(Debug)]
pub struct AggregationEngine {
    changes: Subscription<RegistryChange>,
    scheduler: RecomputeScheduler,
    snapshot: Arc<[AggregatedEntry]>,
    generation: u64,
    subscribers: Subscribers<ServersChanged>,
    metrics: RecomputeMetrics,
}

impl AggregationEngine {
    /// Subscribes to `registry` and queues the initial recompute.
    pub fn attach(registry: &mut CollectionRegistry) -> Self {
        let mut scheduler = RecomputeScheduler::new();
        scheduler.request();

        Self {
            changes: registry.subscribe(),
            scheduler,
            snapshot: Arc::from(Vec::new()),
            generation: 0,
            subscribers: Subscribers::default(),
            metrics: RecomputeMetrics::new(),
        }
    }

    /// Stops listening to `registry`.
    pub fn detach(self, registry: &mut CollectionRegistry) {
        registry.unsubscribe(self.changes.id());
        self.metrics.log_summary();
    }

    pub fn subscribe(&mut self) -> Subscription<ServersChanged> {
        self.subscribers.subscribe()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// The last emitted canonical list.
    #[must_use]
    pub fn servers(&self) -> Arc<[AggregatedEntry]> {
        Arc::clone(&self.snapshot)
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn metrics(&self) -> &RecomputeMetrics {
        &self.metrics
    }

    #[must_use]
    pub const fn scheduler(&self) -> &RecomputeScheduler {
        &self.scheduler
    }

    /// Queues a recompute without a registry change, e.g. after consent changed.
    pub fn request_recompute(&mut self) {
        if self.scheduler.request() {
            self.metrics.coalesced_requests = self.metrics.coalesced_requests.saturating_add(1);
        }
    }

    /// Applies pending contributor updates and runs every queued recompute.
    ///
    /// Returns the change event if the final result differs from the last
    /// emitted one. A result superseded by changes that arrived while it was
    /// computed is dropped in favour of the follow-up run.
    pub fn pump(&mut self, registry: &mut CollectionRegistry) -> Option<ServersChanged> {
        registry.apply_pending();
        self.observe_changes();

        let mut emitted = None;

        while self.scheduler.begin() {
            let timer = Timer::new("recompute");
            let collections = registry.snapshot();
            let resolution = resolve_with_report(collections.iter().map(Arc::as_ref));
            self.metrics.record_recompute(timer.stop());

            // Anything contributors posted while this run was in flight.
            registry.apply_pending();
            self.observe_changes();
            self.scheduler.finish();

            if self.scheduler.is_scheduled() {
                debug!("Recompute superseded by newer changes");
                self.metrics.superseded = self.metrics.superseded.saturating_add(1);
                continue;
            }

            if let Some(event) = self.commit(resolution.entries) {
                emitted = Some(event);
            }
        }

        emitted
    }

    fn observe_changes(&mut self) {
        for change in self.changes.drain() {
            debug!("Registry change: {:?}", change);
            self.request_recompute();
        }
    }

    fn commit(&mut self, next: Vec<AggregatedEntry>) -> Option<ServersChanged> {
        let diff = diff_entries(&self.snapshot, &next);
        if diff.is_empty() {
            debug!("Recompute produced no changes");
            return None;
        }

        self.generation = self.generation.saturating_add(1);
        self.snapshot = Arc::from(next);

        let event = ServersChanged {
            generation: self.generation,
            at: Utc::now(),
            servers: Arc::clone(&self.snapshot),
            added: diff.added,
            removed: diff.removed,
            updated: diff.updated,
        };

        info!(
            "Server list generation {}: {} server(s), +{} -{} ~{}",
            event.generation,
            event.servers.len(),
            event.added.len(),
            event.removed.len(),
            event.updated.len()
        );

        self.subscribers.emit(&event);
        self.metrics.emitted = self.metrics.emitted.saturating_add(1);
        Some(event)
    }
}
