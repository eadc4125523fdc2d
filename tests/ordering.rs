#![cfg(not(loom))]
//! Ordering properties under randomised interleavings of production, demand
//! and rebinding.

use std::{sync::Arc, thread};

use proptest::prelude::*;
use pushflow::{
    demand::{Sink, Source},
    flow::FlowController,
};
use pushflow_testing::RecordingSink;
use rstest::rstest;

#[derive(Debug, Clone)]
enum Action {
    Produce,
    Grant(u64),
    RequestMore,
    Detach,
    Rebind,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => Just(Action::Produce),
        3 => (0u64..4).prop_map(Action::Grant),
        1 => Just(Action::RequestMore),
        1 => Just(Action::Detach),
        1 => Just(Action::Rebind),
    ]
}

/// Apply `actions`, then bind a final sink with unlimited demand, returning
/// every sink's deliveries in bind order and the number produced.
fn run_actions(actions: &[Action]) -> (Vec<Vec<u32>>, u32) {
    let controller = FlowController::<u32>::builder()
        .unbounded()
        .build()
        .expect("failed to build FlowController");
    let mut sinks = vec![RecordingSink::new()];
    controller.bind(sinks[0].as_sink());
    let mut produced = 0;

    for action in actions {
        let current = sinks.last().expect("at least one sink");
        match action {
            Action::Produce => {
                controller.offer(produced).expect("offer failed");
                produced += 1;
            }
            Action::Grant(n) => current.grant(*n),
            Action::RequestMore => controller.request_more(),
            Action::Detach => current.remove_source(),
            Action::Rebind => {
                let sink = RecordingSink::new();
                controller.bind(sink.as_sink());
                sinks.push(sink);
            }
        }
    }

    let last = RecordingSink::unbounded();
    controller.bind(last.as_sink());
    sinks.push(last);
    (sinks.iter().map(|sink| sink.received()).collect(), produced)
}

proptest! {
    #[test]
    fn deliveries_preserve_production_order(
        actions in proptest::collection::vec(action_strategy(), 0..64)
    ) {
        let (per_sink, produced) = run_actions(&actions);
        let delivered: Vec<u32> = per_sink.into_iter().flatten().collect();
        prop_assert_eq!(delivered, (0..produced).collect::<Vec<_>>());
    }

    #[test]
    fn never_delivers_more_than_granted(grants in proptest::collection::vec(0u64..5, 0..16)) {
        let controller = FlowController::<u32>::builder()
            .unbounded()
            .build()
            .expect("failed to build FlowController");
        let sink = RecordingSink::new();
        controller.bind(sink.as_sink());
        for message in 0..32 {
            controller.offer(message).expect("offer failed");
        }
        let mut granted = 0u64;
        for n in grants {
            sink.grant(n);
            granted += n;
        }
        let expected = usize::try_from(granted.min(32)).expect("small value");
        prop_assert_eq!(sink.len(), expected);
    }
}

#[rstest]
#[case::empty(Vec::new())]
#[case::detach_then_produce(vec![Action::Detach, Action::Produce, Action::Grant(1), Action::Produce])]
#[case::rebind_between(vec![
    Action::Produce,
    Action::Grant(1),
    Action::Produce,
    Action::Rebind,
    Action::Grant(3),
    Action::Produce,
])]
fn boundary_cases(#[case] actions: Vec<Action>) {
    let (per_sink, produced) = run_actions(&actions);
    let delivered: Vec<u32> = per_sink.into_iter().flatten().collect();
    assert_eq!(delivered, (0..produced).collect::<Vec<_>>());
}

/// A producer thread and a consumer thread granting credit in small steps
/// deliver every message exactly once and in order.
#[rstest]
fn concurrent_producer_and_consumer_preserve_order() {
    const COUNT: u32 = 10_000;
    let controller = FlowController::<u32>::builder()
        .unbounded()
        .build()
        .expect("failed to build FlowController");
    let sink = RecordingSink::new();
    controller.bind(sink.as_sink());

    let producer = thread::spawn({
        let controller = controller.clone();
        move || {
            for message in 0..COUNT {
                controller.offer(message).expect("offer failed");
            }
        }
    });
    let consumer = thread::spawn({
        let sink = Arc::clone(&sink);
        move || {
            while sink.len() < COUNT as usize {
                sink.grant(7);
                thread::yield_now();
            }
        }
    });

    producer.join().expect("producer panicked");
    consumer.join().expect("consumer panicked");
    assert_eq!(sink.received(), (0..COUNT).collect::<Vec<_>>());
}

/// Rebinding from another thread while the producer runs never duplicates
/// or reorders messages across sinks.
#[rstest]
fn concurrent_rebinding_preserves_order() {
    const COUNT: u32 = 5_000;
    let controller = FlowController::<u32>::builder()
        .unbounded()
        .build()
        .expect("failed to build FlowController");

    let producer = thread::spawn({
        let controller = controller.clone();
        move || {
            for message in 0..COUNT {
                controller.offer(message).expect("offer failed");
            }
        }
    });
    let binder = thread::spawn({
        let controller = controller.clone();
        move || {
            let mut sinks = Vec::new();
            for _ in 0..50 {
                let sink = RecordingSink::unbounded();
                controller.bind(Arc::clone(&sink) as Arc<dyn Sink<u32>>);
                sinks.push(sink);
                thread::yield_now();
            }
            sinks
        }
    });

    producer.join().expect("producer panicked");
    let mut sinks = binder.join().expect("binder panicked");
    let last = RecordingSink::unbounded();
    controller.bind(last.as_sink());
    sinks.push(last);

    let delivered: Vec<u32> = sinks.iter().flat_map(|sink| sink.received()).collect();
    assert_eq!(delivered, (0..COUNT).collect::<Vec<_>>());
}
