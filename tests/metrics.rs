#![cfg(not(loom))]
//! Tests for `pushflow` metrics.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};
use pushflow::{
    buffer::OverflowPolicy,
    flow::{FlowController, TerminationPolicy},
    metrics::{
        BINDINGS_ACTIVE,
        MESSAGES_BUFFERED,
        MESSAGES_DELIVERED,
        MESSAGES_DISCARDED,
        OVERFLOWS_TOTAL,
    },
};
use pushflow_testing::RecordingSink;
use rstest::rstest;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Take a single snapshot. Reading counters resets them, so every assertion
/// in a test must use the same snapshot.
fn snapshot(snapshotter: &Snapshotter) -> Vec<(CompositeKey, DebugValue)> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(k, _, _, v)| (k, v))
        .collect()
}

fn counter_value(
    metrics: &[(CompositeKey, DebugValue)],
    name: &str,
    label: Option<(&str, &str)>,
) -> u64 {
    metrics
        .iter()
        .filter(|(k, _)| {
            k.key().name() == name
                && label.is_none_or(|(key, value)| {
                    k.key()
                        .labels()
                        .any(|l| l.key() == key && l.value() == value)
                })
        })
        .map(|(_, v)| match v {
            DebugValue::Counter(c) => *c,
            _ => 0,
        })
        .sum()
}

fn gauge_value(metrics: &[(CompositeKey, DebugValue)], name: &str) -> Option<f64> {
    metrics.iter().find_map(|(k, v)| match v {
        DebugValue::Gauge(g) if k.key().name() == name => Some(g.into_inner()),
        _ => None,
    })
}

#[rstest]
fn delivery_paths_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let controller = FlowController::<u8>::builder()
            .build()
            .expect("failed to build FlowController");
        let sink = RecordingSink::new();
        controller.bind(sink.as_sink());
        controller.offer(1).expect("offer failed");
        sink.grant(2);
        controller.offer(2).expect("offer failed");
    });

    let recorded = snapshot(&snapshotter);
    assert_eq!(
        counter_value(&recorded, MESSAGES_DELIVERED, Some(("path", "drained"))),
        1
    );
    assert_eq!(
        counter_value(&recorded, MESSAGES_DELIVERED, Some(("path", "immediate"))),
        1
    );
    assert_eq!(counter_value(&recorded, MESSAGES_BUFFERED, None), 1);
}

#[rstest]
fn overflow_and_discards_are_counted() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let controller = FlowController::<u8>::builder()
            .capacity(1)
            .overflow_policy(OverflowPolicy::DropOldest)
            .termination_policy(TerminationPolicy::Discard)
            .build()
            .expect("failed to build FlowController");
        for message in 0..3 {
            controller.offer(message).expect("offer failed");
        }
        controller.terminate();
    });

    let recorded = snapshot(&snapshotter);
    assert_eq!(
        counter_value(&recorded, OVERFLOWS_TOTAL, Some(("policy", "drop_oldest"))),
        2
    );
    assert_eq!(
        counter_value(&recorded, MESSAGES_DISCARDED, Some(("reason", "evicted"))),
        2
    );
    assert_eq!(
        counter_value(&recorded, MESSAGES_DISCARDED, Some(("reason", "terminated"))),
        1
    );
}

#[rstest]
fn binding_gauge_tracks_bind_and_unbind() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    let _kept = metrics::with_local_recorder(&recorder, || {
        let controller = FlowController::<u8>::builder()
            .build()
            .expect("failed to build FlowController");
        let sink = RecordingSink::new();
        controller.bind(sink.as_sink());
        controller.bind(sink.as_sink());
        (controller, sink)
    });

    let gauge = gauge_value(&snapshot(&snapshotter), BINDINGS_ACTIVE)
        .expect("bindings gauge not recorded");
    assert!((gauge - 1.0).abs() < f64::EPSILON, "one binding should remain");
}

#[rstest]
fn dropping_bound_controllers_releases_the_gauge() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        let sinks: Vec<_> = (0..3).map(|_| RecordingSink::new()).collect();
        for sink in &sinks {
            let controller = FlowController::<u8>::builder()
                .build()
                .expect("failed to build FlowController");
            controller.bind(sink.as_sink());
        }
        let unbound = FlowController::<u8>::builder()
            .build()
            .expect("failed to build FlowController");
        drop(unbound);
    });

    let gauge = gauge_value(&snapshot(&snapshotter), BINDINGS_ACTIVE)
        .expect("bindings gauge not recorded");
    assert!(gauge.abs() < f64::EPSILON, "dropped controllers hold no binding");
}
