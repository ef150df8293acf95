use crate::fixtures::collection_fixtures::{stdio_def, user, with_nonce, workspace};
use concordia::gate::{
    LaunchCoordinator, LaunchRequest, Launcher, LifecycleGate, MemoryConsentStore,
};
use concordia::model::{EntryKey, TrustBehavior};
use concordia::{resolve, AggregatedEntry, BlockReason, ConcordiaError, GateDecision};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct FakeLauncher {
    launched: Vec<String>,
    stopped: Vec<String>,
    fail_on: Option<String>,
}

impl Launcher for FakeLauncher {
    fn launch(&mut self, request: &LaunchRequest) -> Result<(), ConcordiaError> {
        if self.fail_on.as_deref() == Some(request.key.server_id.as_str()) {
            return Err(ConcordiaError::LauncherFailure {
                key: request.key.to_string(),
                message: "spawn failed".to_string(),
            });
        }
        self.launched.push(request.key.to_string());
        Ok(())
    }

    fn stop(&mut self, key: &EntryKey) {
        self.stopped.push(key.to_string());
    }
}

fn entries_with_nonce(nonce: &str) -> Vec<AggregatedEntry> {
    let ws = workspace("ws", vec![with_nonce(stdio_def("s", &["x"]), nonce)]);
    resolve([&ws])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_gates_relaunch() {
        let gate = LifecycleGate::new(MemoryConsentStore::new());
        let entries = entries_with_nonce("n1");
        let entry = entries.first().unwrap();

        assert_eq!(gate.decide(entry, None), GateDecision::LaunchFresh);
        assert_eq!(gate.decide(entry, Some("n1")), GateDecision::ReuseExisting);
        assert_eq!(gate.decide(entry, Some("n0")), GateDecision::LaunchFresh);
    }

    #[test]
    fn test_empty_nonce_matches_only_empty() {
        let gate = LifecycleGate::new(MemoryConsentStore::new());
        let entries = entries_with_nonce("");
        let entry = entries.first().unwrap();

        assert_eq!(gate.decide(entry, Some("")), GateDecision::ReuseExisting);
        assert_eq!(gate.decide(entry, Some("n1")), GateDecision::LaunchFresh);
    }

    #[test]
    fn test_untrusted_collection_is_never_launched() {
        let mut ws = workspace("ws", vec![stdio_def("s", &[])]);
        ws.trust_behavior = TrustBehavior::Untrusted;
        let entries = resolve([&ws]);

        let mut coordinator = LaunchCoordinator::new(LifecycleGate::new(MemoryConsentStore::new()));
        let mut launcher = FakeLauncher::default();
        let report = coordinator.reconcile(&entries, &mut launcher);

        assert!(launcher.launched.is_empty());
        assert_eq!(
            report.decisions.first().map(|(_, d)| *d),
            Some(GateDecision::Blocked(BlockReason::Untrusted))
        );
    }

    #[test]
    fn test_reconcile_relaunches_on_nonce_change() {
        let mut coordinator = LaunchCoordinator::new(LifecycleGate::new(MemoryConsentStore::new()));
        let mut launcher = FakeLauncher::default();

        coordinator.reconcile(&entries_with_nonce("n1"), &mut launcher);
        assert_eq!(launcher.launched, vec!["ws/s"]);

        let report = coordinator.reconcile(&entries_with_nonce("n1"), &mut launcher);
        assert!(report.launched.is_empty());
        assert_eq!(launcher.launched.len(), 1);

        let report = coordinator.reconcile(&entries_with_nonce("n2"), &mut launcher);
        assert_eq!(launcher.stopped, vec!["ws/s"]);
        assert_eq!(launcher.launched, vec!["ws/s", "ws/s"]);
        assert_eq!(report.stopped.len(), 1);
        assert_eq!(
            coordinator.running().get(&EntryKey::new("ws", "s")).map(String::as_str),
            Some("n2")
        );
    }

    #[test]
    fn test_reconcile_stops_entries_that_disappeared() {
        let running = BTreeMap::from([(EntryKey::new("usr", "gone"), "n".to_string())]);
        let mut coordinator =
            LaunchCoordinator::new(LifecycleGate::new(MemoryConsentStore::new()))
                .with_running(running);
        let mut launcher = FakeLauncher::default();

        coordinator.reconcile(&entries_with_nonce("n1"), &mut launcher);

        assert_eq!(launcher.stopped, vec!["usr/gone"]);
        assert!(!coordinator.running().contains_key(&EntryKey::new("usr", "gone")));
    }

    #[test]
    fn test_launcher_failure_is_isolated() {
        let ws = workspace("ws", vec![stdio_def("bad", &[]), stdio_def("good", &[])]);
        let usr = user("usr", vec![stdio_def("other", &["u"])]);
        let entries = resolve([&ws, &usr]);

        let mut coordinator = LaunchCoordinator::new(LifecycleGate::new(MemoryConsentStore::new()));
        let mut launcher = FakeLauncher { fail_on: Some("bad".to_string()), ..FakeLauncher::default() };
        let report = coordinator.reconcile(&entries, &mut launcher);

        assert_eq!(launcher.launched, vec!["ws/good", "usr/other"]);
        assert_eq!(report.failures.len(), 1);
        assert!(!coordinator.running().contains_key(&EntryKey::new("ws", "bad")));
    }

    #[test]
    fn test_revoked_consent_stops_running_launch() {
        let mut ws = workspace("ws", vec![stdio_def("s", &[])]);
        ws.trust_behavior = TrustBehavior::Prompt;
        let entries = resolve([&ws]);
        let key = EntryKey::new("ws", "s");

        let consent: MemoryConsentStore = [key.clone()].into_iter().collect();
        let mut coordinator = LaunchCoordinator::new(LifecycleGate::new(consent));
        let mut launcher = FakeLauncher::default();

        coordinator.reconcile(&entries, &mut launcher);
        assert_eq!(launcher.launched, vec!["ws/s"]);

        assert!(coordinator.gate_mut().consent_mut().revoke(&key));
        let report = coordinator.reconcile(&entries, &mut launcher);

        assert_eq!(launcher.stopped, vec!["ws/s"]);
        assert_eq!(
            report.decisions.first().map(|(_, d)| *d),
            Some(GateDecision::Blocked(BlockReason::NeedsConsent))
        );
    }

    #[test]
    fn test_plan_does_not_touch_running_set() {
        let coordinator = LaunchCoordinator::new(LifecycleGate::new(MemoryConsentStore::new()));
        let plan = coordinator.plan(&entries_with_nonce("n1"));

        assert_eq!(plan, vec![(EntryKey::new("ws", "s"), GateDecision::LaunchFresh)]);
        assert!(coordinator.running().is_empty());
    }
}
