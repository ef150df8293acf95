//! Decides whether a canonical entry may be handed to the launcher, and
//! whether an already running launch can be kept.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::model::{AggregatedEntry, EntryKey, ServerLaunch, TrustBehavior};
use crate::ConcordiaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Untrusted,
    NeedsConsent,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untrusted => f.write_str("untrusted"),
            Self::NeedsConsent => f.write_str("needs-consent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Start a new launch, terminating any existing one for the same entry first.
    LaunchFresh,
    /// The running launch is still current.
    ReuseExisting,
    Blocked(BlockReason),
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LaunchFresh => f.write_str("launch-fresh"),
            Self::ReuseExisting => f.write_str("reuse-existing"),
            Self::Blocked(reason) => write!(f, "blocked ({reason})"),
        }
    }
}

/// Where consent for `Prompt` collections is recorded. Asking the user is
/// someone else's job; the gate only reads the answer.
pub trait ConsentStore {
    fn has_consent(&self, key: &EntryKey) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConsentStore {
    granted: HashSet<EntryKey>,
}

impl MemoryConsentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, key: EntryKey) {
        self.granted.insert(key);
    }

    pub fn revoke(&mut self, key: &EntryKey) -> bool {
        self.granted.remove(key)
    }
}

impl FromIterator<EntryKey> for MemoryConsentStore {
    fn from_iter<T: IntoIterator<Item = EntryKey>>(iter: T) -> Self {
        Self { granted: iter.into_iter().collect() }
    }
}

impl ConsentStore for MemoryConsentStore {
    fn has_consent(&self, key: &EntryKey) -> bool {
        self.granted.contains(key)
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleGate<C> {
    consent: C,
}

impl<C: ConsentStore> LifecycleGate<C> {
    pub const fn new(consent: C) -> Self {
        Self { consent }
    }

    pub fn consent_mut(&mut self) -> &mut C {
        &mut self.consent
    }

    /// `previous_nonce` is the cache nonce of the launch currently running for
    /// this entry, if any.
    pub fn decide(&self, entry: &AggregatedEntry, previous_nonce: Option<&str>) -> GateDecision {
        match entry.trust_behavior {
            TrustBehavior::Untrusted => return GateDecision::Blocked(BlockReason::Untrusted),
            TrustBehavior::Prompt if !self.consent.has_consent(&entry.key()) => {
                return GateDecision::Blocked(BlockReason::NeedsConsent);
            },
            TrustBehavior::Prompt | TrustBehavior::Trusted => {},
        }

        match previous_nonce {
            Some(nonce) if nonce == entry.definition.cache_nonce => GateDecision::ReuseExisting,
            _ => GateDecision::LaunchFresh,
        }
    }
}

/// What the launcher receives for every `LaunchFresh` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub key: EntryKey,
    pub label: String,
    pub launch: ServerLaunch,
    pub cache_nonce: String,
}

impl From<&AggregatedEntry> for LaunchRequest {
    fn from(entry: &AggregatedEntry) -> Self {
        Self {
            key: entry.key(),
            label: entry.definition.label.clone(),
            launch: entry.definition.launch.clone(),
            cache_nonce: entry.definition.cache_nonce.clone(),
        }
    }
}

/// Spawns stdio processes or opens network connections. Implemented outside this crate.
pub trait Launcher {
    /// # Errors
    ///
    /// Returns `LauncherFailure` when the server could not be started.
    fn launch(&mut self, request: &LaunchRequest) -> Result<(), ConcordiaError>;

    fn stop(&mut self, key: &EntryKey);
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub decisions: Vec<(EntryKey, GateDecision)>,
    pub launched: Vec<EntryKey>,
    pub stopped: Vec<EntryKey>,
    pub failures: Vec<ConcordiaError>,
}

/// Tracks the nonce of every running launch and drives a [`Launcher`] from the
/// canonical list.
#[derive(Debug)]
pub struct LaunchCoordinator<C> {
    gate: LifecycleGate<C>,
    running: BTreeMap<EntryKey, String>,
}

impl<C: ConsentStore> LaunchCoordinator<C> {
    pub const fn new(gate: LifecycleGate<C>) -> Self {
        Self { gate, running: BTreeMap::new() }
    }

    /// Starts from launches recorded earlier, e.g. in a state file.
    #[must_use]
    pub fn with_running(mut self, running: BTreeMap<EntryKey, String>) -> Self {
        self.running = running;
        self
    }

    pub fn gate_mut(&mut self) -> &mut LifecycleGate<C> {
        &mut self.gate
    }

    /// Entry keys of running launches mapped to the nonce they were started with.
    pub const fn running(&self) -> &BTreeMap<EntryKey, String> {
        &self.running
    }

    /// Gate decisions for `entries` without touching any launch.
    pub fn plan(&self, entries: &[AggregatedEntry]) -> Vec<(EntryKey, GateDecision)> {
        entries
            .iter()
            .map(|entry| {
                let key = entry.key();
                let decision = self.gate.decide(entry, self.running.get(&key).map(String::as_str));
                (key, decision)
            })
            .collect()
    }

    /// Brings the running set in line with `entries`.
    ///
    /// A launcher failure is recorded for that entry only; the remaining
    /// entries are still processed. Entries that disappeared from the list or
    /// became blocked are stopped.
    pub fn reconcile<L: Launcher>(
        &mut self,
        entries: &[AggregatedEntry],
        launcher: &mut L,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (entry, (key, decision)) in entries.iter().zip(self.plan(entries)) {
            match decision {
                GateDecision::LaunchFresh => {
                    if self.running.remove(&key).is_some() {
                        launcher.stop(&key);
                        report.stopped.push(key.clone());
                    }

                    let request = LaunchRequest::from(entry);
                    match launcher.launch(&request) {
                        Ok(()) => {
                            debug!("Launched {} (nonce '{}')", key, request.cache_nonce);
                            self.running.insert(key.clone(), request.cache_nonce);
                            report.launched.push(key.clone());
                        },
                        Err(e) => {
                            warn!("Failed to launch {}: {}", key, e);
                            report.failures.push(e);
                        },
                    }
                },
                GateDecision::ReuseExisting => {},
                GateDecision::Blocked(reason) => {
                    if self.running.remove(&key).is_some() {
                        debug!("Stopping {} ({})", key, reason);
                        launcher.stop(&key);
                        report.stopped.push(key.clone());
                    }
                },
            }

            report.decisions.push((key, decision));
        }

        let live: HashSet<EntryKey> = entries.iter().map(AggregatedEntry::key).collect();
        let gone: Vec<EntryKey> =
            self.running.keys().filter(|key| !live.contains(*key)).cloned().collect();

        for key in gone {
            debug!("Stopping {} (no longer in the server list)", key);
            self.running.remove(&key);
            launcher.stop(&key);
            report.stopped.push(key);
        }

        report
    }
}
