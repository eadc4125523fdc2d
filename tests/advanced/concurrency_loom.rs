#![cfg(all(feature = "advanced-tests", loom))]
//! Concurrency tests for the flow controller using loom.
//!
//! These tests exercise the delivery lock and drain-request handshake
//! without Tokio. `loom` explores interleavings to ensure demand signals are
//! never lost and deliveries stay ordered across rebinding.

use loom::{model, thread};
use pushflow::flow::FlowController;
use pushflow_testing::RecordingSink;

#[test]
fn demand_signal_racing_offer_is_not_lost() {
    model(|| {
        let controller = FlowController::<u8>::builder()
            .unbounded()
            .build()
            .expect("failed to build FlowController");
        let sink = RecordingSink::new();
        controller.bind(sink.as_sink());

        let producer = thread::spawn({
            let controller = controller.clone();
            move || {
                controller.offer(0).expect("first offer failed");
                controller.offer(1).expect("second offer failed");
            }
        });
        let consumer = thread::spawn({
            let sink = std::sync::Arc::clone(&sink);
            move || sink.grant(2)
        });

        producer.join().expect("producer thread panicked");
        consumer.join().expect("consumer thread panicked");

        assert_eq!(sink.received(), vec![0, 1]);
        assert_eq!(controller.pending_len(), 0);
    });
}

#[test]
fn rebinding_racing_offer_keeps_order() {
    model(|| {
        let controller = FlowController::<u8>::builder()
            .unbounded()
            .build()
            .expect("failed to build FlowController");
        let first = RecordingSink::unbounded();
        controller.bind(first.as_sink());

        let producer = thread::spawn({
            let controller = controller.clone();
            move || {
                controller.offer(0).expect("first offer failed");
                controller.offer(1).expect("second offer failed");
            }
        });
        let binder = thread::spawn({
            let controller = controller.clone();
            move || {
                let second = RecordingSink::new();
                controller.bind(second.as_sink());
                second
            }
        });

        producer.join().expect("producer thread panicked");
        let second = binder.join().expect("binder thread panicked");
        let last = RecordingSink::unbounded();
        controller.bind(last.as_sink());

        let delivered: Vec<u8> = [first, second, last]
            .iter()
            .flat_map(|sink| sink.received())
            .collect();
        assert_eq!(delivered, vec![0, 1]);
    });
}
