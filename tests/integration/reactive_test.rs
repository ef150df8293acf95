use crate::fixtures::collection_fixtures::{http_def, remote, stdio_def, user, with_nonce, workspace};
use concordia::gate::{LaunchCoordinator, LaunchRequest, Launcher, LifecycleGate, MemoryConsentStore};
use concordia::model::EntryKey;
use concordia::registry::ContributorUpdate;
use concordia::{resolve, AggregationEngine, CollectionRegistry, ConcordiaError};
use std::thread;

#[derive(Debug, Default)]
struct RecordingLauncher {
    events: Vec<String>,
}

impl Launcher for RecordingLauncher {
    fn launch(&mut self, request: &LaunchRequest) -> Result<(), ConcordiaError> {
        self.events.push(format!("launch {} {}", request.key, request.cache_nonce));
        Ok(())
    }

    fn stop(&mut self, key: &EntryKey) {
        self.events.push(format!("stop {key}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contributor_threads_drive_launches() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);
        let changes = engine.subscribe();
        let mut coordinator = LaunchCoordinator::new(LifecycleGate::new(MemoryConsentStore::new()));
        let mut launcher = RecordingLauncher::default();

        registry.register(user("usr", vec![stdio_def("fs", &["/home"])])).unwrap();
        registry.register_lazy(remote("ssh", "ssh-remote+box", Vec::new())).unwrap();

        let event = engine.pump(&mut registry).unwrap();
        coordinator.reconcile(&event.servers, &mut launcher);
        assert_eq!(launcher.events, vec!["launch usr/fs test-nonce"]);

        let workspace_mailbox = registry.mailbox();
        let remote_mailbox = registry.mailbox();
        let contributors = [
            thread::spawn(move || {
                workspace_mailbox
                    .send(ContributorUpdate::Register(workspace(
                        "ws",
                        vec![stdio_def("fs", &["/home"])],
                    )))
                    .unwrap();
            }),
            thread::spawn(move || {
                remote_mailbox
                    .send(ContributorUpdate::CompleteDiscovery {
                        collection_id: "ssh".to_string(),
                        definitions: vec![http_def("api", "https://box/mcp")],
                    })
                    .unwrap();
            }),
        ];
        for contributor in contributors {
            contributor.join().unwrap();
        }

        let event = engine.pump(&mut registry).unwrap();
        let keys: Vec<String> = event.servers.iter().map(|e| e.key().to_string()).collect();
        assert_eq!(keys, vec!["ws/fs", "ssh/api"]);
        assert_eq!(event.removed, vec![EntryKey::new("usr", "fs")]);

        launcher.events.clear();
        coordinator.reconcile(&event.servers, &mut launcher);
        assert_eq!(
            launcher.events,
            vec!["launch ws/fs test-nonce", "launch ssh/api http-nonce", "stop usr/fs"]
        );

        assert_eq!(changes.drain().len(), 2);
    }

    #[test]
    fn test_nonce_bump_relaunches_only_that_server() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);
        let mut coordinator = LaunchCoordinator::new(LifecycleGate::new(MemoryConsentStore::new()));
        let mut launcher = RecordingLauncher::default();

        registry
            .register(workspace("ws", vec![stdio_def("a", &[]), stdio_def("b", &[])]))
            .unwrap();
        let event = engine.pump(&mut registry).unwrap();
        coordinator.reconcile(&event.servers, &mut launcher);
        launcher.events.clear();

        registry
            .set_definitions("ws", vec![stdio_def("a", &[]), with_nonce(stdio_def("b", &[]), "v2")])
            .unwrap();
        let event = engine.pump(&mut registry).unwrap();
        coordinator.reconcile(&event.servers, &mut launcher);

        assert_eq!(launcher.events, vec!["stop ws/b", "launch ws/b v2"]);
    }

    #[test]
    fn test_burst_of_updates_settles_on_final_state() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);
        registry.register(workspace("ws", Vec::new())).unwrap();
        engine.pump(&mut registry);

        let mailbox = registry.mailbox();
        let contributor = thread::spawn(move || {
            for round in 0..50 {
                let nonce = format!("n{round}");
                mailbox
                    .send(ContributorUpdate::SetDefinitions {
                        collection_id: "ws".to_string(),
                        definitions: vec![with_nonce(stdio_def("s", &[]), &nonce)],
                    })
                    .unwrap();
            }
        });

        let mut events = 0;
        loop {
            let finished = contributor.is_finished();
            if engine.pump(&mut registry).is_some() {
                events += 1;
            }
            if finished {
                break;
            }
            thread::yield_now();
        }
        contributor.join().unwrap();
        engine.pump(&mut registry);

        let expected = resolve([&workspace("ws", vec![with_nonce(stdio_def("s", &[]), "n49")])]);
        assert_eq!(engine.servers().to_vec(), expected);
        assert!(events >= 1);
        assert!(events <= 50);
        assert_eq!(
            engine.metrics().recomputes,
            engine.metrics().emitted + engine.metrics().superseded + 1
        );
    }
}
