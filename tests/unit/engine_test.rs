use crate::fixtures::collection_fixtures::{http_def, remote, stdio_def, user, with_nonce, workspace};
use concordia::engine::{diff_entries, SchedulerState};
use concordia::model::EntryKey;
use concordia::registry::ContributorUpdate;
use concordia::{resolve, AggregationEngine, CollectionRegistry};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(entries: &[concordia::AggregatedEntry]) -> Vec<String> {
        entries.iter().map(|e| e.key().to_string()).collect()
    }

    #[test]
    fn test_empty_registry_emits_nothing() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);

        assert!(engine.pump(&mut registry).is_none());
        assert!(engine.servers().is_empty());
        assert_eq!(engine.generation(), 0);
        assert_eq!(engine.metrics().recomputes, 1);
    }

    #[test]
    fn test_changes_before_pump_are_coalesced() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);
        let sub = engine.subscribe();

        registry.register(workspace("ws", vec![stdio_def("a", &[])])).unwrap();
        registry.register(user("usr", vec![stdio_def("b", &[])])).unwrap();
        registry.set_definitions("usr", vec![stdio_def("c", &[])]).unwrap();

        let event = engine.pump(&mut registry).expect("first result should be emitted");

        assert_eq!(event.generation, 1);
        assert_eq!(keys(&event.servers), vec!["ws/a", "usr/c"]);
        assert_eq!(event.added.len(), 2);
        assert_eq!(sub.drain().len(), 1);
        assert_eq!(engine.metrics().recomputes, 1);
        assert_eq!(engine.metrics().coalesced_requests, 3);
        assert_eq!(engine.scheduler().state(), SchedulerState::Idle);
    }

    #[test]
    fn test_unchanged_result_is_not_emitted() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);
        registry.register(workspace("ws", vec![stdio_def("a", &[])])).unwrap();
        engine.pump(&mut registry);

        engine.request_recompute();
        assert!(engine.pump(&mut registry).is_none());

        // An identical lower-ranked copy collapses and leaves the list as it was.
        registry.register(user("usr", vec![stdio_def("a", &[])])).unwrap();
        assert!(engine.pump(&mut registry).is_none());
        assert_eq!(engine.generation(), 1);
    }

    #[test]
    fn test_partial_collections_do_not_block_results() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);

        registry.register(user("usr", vec![stdio_def("local", &[])])).unwrap();
        registry.register_lazy(remote("ssh", "ssh-remote+box", Vec::new())).unwrap();

        let event = engine.pump(&mut registry).expect("known collections should resolve");
        assert_eq!(keys(&event.servers), vec!["usr/local"]);

        registry
            .mailbox()
            .send(ContributorUpdate::CompleteDiscovery {
                collection_id: "ssh".to_string(),
                definitions: vec![http_def("remote-api", "https://box/mcp")],
            })
            .unwrap();

        let event = engine.pump(&mut registry).expect("discovery should update the list");
        assert_eq!(keys(&event.servers), vec!["usr/local", "ssh/remote-api"]);
        assert_eq!(keys(&event.added), vec!["ssh/remote-api"]);
        assert!(event.removed.is_empty());
    }

    #[test]
    fn test_lazy_definitions_stay_hidden_until_discovery_completes() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);

        registry.register_lazy(user("usr", Vec::new())).unwrap();
        registry.set_definitions("usr", vec![stdio_def("early", &[])]).unwrap();

        assert!(engine.pump(&mut registry).is_none());
        assert!(engine.servers().is_empty());
    }

    #[test]
    fn test_unregister_and_nonce_change_are_reported() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);
        registry.register(workspace("ws", vec![stdio_def("a", &[])])).unwrap();
        registry.register(user("usr", vec![stdio_def("b", &[])])).unwrap();
        engine.pump(&mut registry);

        registry.unregister("usr").unwrap();
        registry.set_definitions("ws", vec![with_nonce(stdio_def("a", &[]), "n2")]).unwrap();

        let event = engine.pump(&mut registry).expect("changes should be emitted");
        assert_eq!(event.removed, vec![EntryKey::new("usr", "b")]);
        assert_eq!(keys(&event.updated), vec!["ws/a"]);
        assert!(event.added.is_empty());
        assert_eq!(event.generation, 2);
    }

    #[test]
    fn test_dropping_the_winner_promotes_the_runner_up() {
        let mut registry = CollectionRegistry::new();
        let mut engine = AggregationEngine::attach(&mut registry);
        registry.register(workspace("ws", vec![stdio_def("a", &[])])).unwrap();
        registry.register(user("usr", vec![stdio_def("a", &[])])).unwrap();
        engine.pump(&mut registry);
        assert_eq!(keys(&engine.servers()), vec!["ws/a"]);

        registry.unregister("ws").unwrap();
        let event = engine.pump(&mut registry).expect("winner changed");

        assert_eq!(keys(&event.servers), vec!["usr/a"]);
        assert_eq!(event.removed, vec![EntryKey::new("ws", "a")]);
        assert_eq!(keys(&event.added), vec!["usr/a"]);
    }

    #[test]
    fn test_detach_stops_listening() {
        let mut registry = CollectionRegistry::new();
        let engine = AggregationEngine::attach(&mut registry);
        assert_eq!(registry.subscriber_count(), 1);

        engine.detach(&mut registry);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn test_diff_entries_classifies_changes() {
        let before = resolve([&workspace("ws", vec![stdio_def("a", &[]), stdio_def("b", &[])])]);
        let after = resolve([&workspace(
            "ws",
            vec![with_nonce(stdio_def("a", &[]), "n2"), stdio_def("c", &[])],
        )]);

        let diff = diff_entries(&before, &after);

        assert_eq!(keys(&diff.added), vec!["ws/c"]);
        assert_eq!(keys(&diff.updated), vec!["ws/a"]);
        assert_eq!(diff.removed, vec![EntryKey::new("ws", "b")]);
        assert!(diff_entries(&after, &after).is_empty());
    }
}
