use anyhow::Result;
use sideband::{JsonCodec, Listener, LoopbackBridge, Sideband};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Relay over a loopback bridge: posts dispatch synchronously on the
/// caller thread, so every assertion below is deterministic.
fn open_relay(dir: &TempDir) -> Sideband<String> {
    Sideband::new(
        dir.path(),
        None,
        Arc::new(JsonCodec::new()),
        Arc::new(LoopbackBridge::new()),
    )
    .expect("relay over temp dir")
}

/// A listener that records every value it is invoked with.
fn recording_listener(name: &str) -> (Listener<String>, Arc<Mutex<Vec<Option<String>>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let listener = Listener::new(name, move |message: Option<&String>| {
        sink.lock().unwrap().push(message.cloned());
    });
    (listener, received)
}

#[cfg(test)]
mod relay_tests {
    use super::*;

    #[test]
    fn should_round_trip_message() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        relay.pass_message("chan", Some(&"payload".to_string()));

        assert_eq!(relay.latest_message("chan"), Some("payload".to_string()));

        Ok(())
    }

    #[test]
    fn should_dispatch_ping_without_touching_stored_value() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        relay.pass_message("chan", Some(&"sticky".to_string()));

        let (listener, received) = recording_listener("observer");
        relay.bind_listener(listener, "chan");

        relay.pass_message("chan", None);

        // Stored value untouched, but the ping still dispatched it.
        assert_eq!(relay.latest_message("chan"), Some("sticky".to_string()));
        let records = received.lock().unwrap();
        assert_eq!(
            *records,
            vec![Some("sticky".to_string()), Some("sticky".to_string())]
        );

        Ok(())
    }

    #[test]
    fn should_dispatch_ping_on_never_written_channel() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        let (listener, received) = recording_listener("observer");
        relay.bind_listener(listener, "silent");

        relay.pass_message("silent", None);

        let records = received.lock().unwrap();
        assert_eq!(*records, vec![None, None]);

        Ok(())
    }

    #[test]
    fn should_destroy_single_message() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        relay.pass_message("chan", Some(&"value".to_string()));
        relay.destroy_message("chan");

        assert_eq!(relay.latest_message("chan"), None);

        Ok(())
    }

    #[test]
    fn should_destroy_all_messages() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        relay.pass_message("one", Some(&"1".to_string()));
        relay.pass_message("two", Some(&"2".to_string()));

        relay.destroy_all_messages();

        assert_eq!(relay.latest_message("one"), None);
        assert_eq!(relay.latest_message("two"), None);

        Ok(())
    }

    #[test]
    fn should_fan_out_same_value_to_all_listeners() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        let (listener_a, received_a) = recording_listener("A");
        let (listener_b, received_b) = recording_listener("B");
        relay.bind_listener(listener_a, "chan");
        relay.bind_listener(listener_b, "chan");

        relay.pass_message("chan", Some(&"shared".to_string()));

        let records_a = received_a.lock().unwrap();
        let records_b = received_b.lock().unwrap();
        assert_eq!(records_a.last(), Some(&Some("shared".to_string())));
        assert_eq!(records_b.last(), Some(&Some("shared".to_string())));

        Ok(())
    }

    #[test]
    fn should_dispatch_in_stable_name_order() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["charlie", "alpha", "bravo"] {
            let sink = Arc::clone(&order);
            relay.bind_listener(
                Listener::new(name, move |_: Option<&String>| {
                    sink.lock().unwrap().push(name);
                }),
                "chan",
            );
        }
        order.lock().unwrap().clear(); // drop the bootstrap invocations

        relay.pass_message("chan", Some(&"go".to_string()));

        assert_eq!(*order.lock().unwrap(), vec!["alpha", "bravo", "charlie"]);

        Ok(())
    }

    #[test]
    fn should_replace_listener_bound_under_same_name() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        let (first, received_first) = recording_listener("A");
        let (second, received_second) = recording_listener("A");
        relay.bind_listener(first, "chan");
        relay.bind_listener(second, "chan");

        relay.pass_message("chan", Some(&"value".to_string()));

        // Only the replacement sees the dispatch; the first listener
        // never fires after its bootstrap call.
        assert_eq!(*received_first.lock().unwrap(), vec![None]);
        assert_eq!(
            *received_second.lock().unwrap(),
            vec![None, Some("value".to_string())]
        );

        Ok(())
    }

    #[test]
    fn should_remove_only_the_named_listener() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        let (listener_a, received_a) = recording_listener("A");
        let (listener_b, received_b) = recording_listener("B");
        relay.bind_listener(listener_a, "chan");
        relay.bind_listener(listener_b, "chan");

        relay.remove_listener_by_name("A", "chan");
        relay.pass_message("chan", Some(&"value".to_string()));

        assert_eq!(*received_a.lock().unwrap(), vec![None]);
        assert_eq!(received_b.lock().unwrap().last(), Some(&Some("value".to_string())));

        Ok(())
    }

    #[test]
    fn should_remove_listener_by_value() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        let (listener, received) = recording_listener("A");
        relay.bind_listener(listener.clone(), "chan");

        relay.remove_listener(&listener, "chan");
        relay.pass_message("chan", Some(&"value".to_string()));

        assert_eq!(*received.lock().unwrap(), vec![None]);

        Ok(())
    }

    #[test]
    fn should_invoke_listener_immediately_on_bind() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        // Nothing stored yet: the catch-up call sees None.
        let (empty_side, received_empty) = recording_listener("early");
        relay.bind_listener(empty_side, "chan");
        assert_eq!(*received_empty.lock().unwrap(), vec![None]);

        // With a value stored, a new listener catches up on it without
        // any further pass_message.
        relay.pass_message("chan", Some(&"stored".to_string()));
        let (late_side, received_late) = recording_listener("late");
        relay.bind_listener(late_side, "chan");
        assert_eq!(
            received_late.lock().unwrap().first(),
            Some(&Some("stored".to_string()))
        );

        Ok(())
    }

    #[test]
    fn should_not_dispatch_on_direct_read() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        let (listener, received) = recording_listener("observer");
        relay.bind_listener(listener, "chan");

        relay.latest_message("chan");
        relay.latest_message("chan");

        // Only the bootstrap invocation is recorded.
        assert_eq!(received.lock().unwrap().len(), 1);

        Ok(())
    }

    #[test]
    fn should_follow_documented_scenario() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);

        let (listener, received) = recording_listener("L1");
        relay.bind_listener(listener, "chan1");

        relay.pass_message("chan1", Some(&"hello".to_string()));
        assert_eq!(
            received.lock().unwrap().last(),
            Some(&Some("hello".to_string()))
        );

        relay.remove_listener_by_name("L1", "chan1");
        let invocations_after_removal = received.lock().unwrap().len();

        relay.pass_message("chan1", Some(&"world".to_string()));

        assert_eq!(received.lock().unwrap().len(), invocations_after_removal);
        assert_eq!(relay.latest_message("chan1"), Some("world".to_string()));

        Ok(())
    }

    #[test]
    fn should_surface_corrupt_stored_bytes_as_absent() -> Result<()> {
        let dir = TempDir::new()?;
        let relay = open_relay(&dir);
        relay.pass_message("chan", Some(&"valid".to_string()));

        // Another writer scribbles over the slot with undecodable bytes.
        let store = sideband::FileStore::new(dir.path(), None)?;
        assert!(store.put("chan", b"\xff\xfenot json"));

        assert_eq!(relay.latest_message("chan"), None);

        Ok(())
    }

    #[test]
    #[should_panic(expected = "channel identifier must not be empty")]
    fn should_panic_on_empty_channel() {
        let dir = TempDir::new().unwrap();
        let relay = open_relay(&dir);

        relay.pass_message("", Some(&"value".to_string()));
    }
}

#[cfg(test)]
mod subscription_tests {
    use super::*;

    fn open_with_bridge(dir: &TempDir, bridge: Arc<LoopbackBridge>) -> Sideband<String> {
        Sideband::new(dir.path(), None, Arc::new(JsonCodec::new()), bridge)
            .expect("relay over temp dir")
    }

    #[test]
    fn should_hold_one_subscription_per_channel() -> Result<()> {
        let dir = TempDir::new()?;
        let bridge = Arc::new(LoopbackBridge::new());
        let relay = open_with_bridge(&dir, Arc::clone(&bridge));

        let (listener_a, _) = recording_listener("A");
        let (listener_b, _) = recording_listener("B");
        relay.bind_listener(listener_a, "chan");
        relay.bind_listener(listener_b, "chan");

        assert_eq!(bridge.subscriber_count("chan"), 1);

        relay.remove_listener_by_name("A", "chan");
        assert_eq!(bridge.subscriber_count("chan"), 1);

        relay.remove_listener_by_name("B", "chan");
        assert_eq!(bridge.subscriber_count("chan"), 0);

        Ok(())
    }

    #[test]
    fn should_release_subscription_on_remove_all() -> Result<()> {
        let dir = TempDir::new()?;
        let bridge = Arc::new(LoopbackBridge::new());
        let relay = open_with_bridge(&dir, Arc::clone(&bridge));

        let (listener_a, _) = recording_listener("A");
        let (listener_b, _) = recording_listener("B");
        relay.bind_listener(listener_a, "chan");
        relay.bind_listener(listener_b, "chan");

        relay.remove_all_listeners("chan");

        assert_eq!(bridge.subscriber_count("chan"), 0);

        Ok(())
    }

    #[test]
    fn should_release_subscriptions_when_relay_drops() -> Result<()> {
        let dir = TempDir::new()?;
        let bridge = Arc::new(LoopbackBridge::new());
        let relay = open_with_bridge(&dir, Arc::clone(&bridge));

        let (listener, _) = recording_listener("A");
        relay.bind_listener(listener, "chan");
        assert_eq!(bridge.subscriber_count("chan"), 1);

        drop(relay);

        assert_eq!(bridge.subscriber_count("chan"), 0);

        Ok(())
    }

    #[test]
    fn should_keep_bindings_across_destroy() -> Result<()> {
        let dir = TempDir::new()?;
        let bridge = Arc::new(LoopbackBridge::new());
        let relay = open_with_bridge(&dir, Arc::clone(&bridge));

        let (listener, received) = recording_listener("A");
        relay.bind_listener(listener, "chan");
        relay.pass_message("chan", Some(&"value".to_string()));

        relay.destroy_message("chan");
        assert_eq!(bridge.subscriber_count("chan"), 1);

        // The binding still dispatches; the destroyed slot reads absent.
        relay.pass_message("chan", None);
        assert_eq!(received.lock().unwrap().last(), Some(&None));

        Ok(())
    }
}
