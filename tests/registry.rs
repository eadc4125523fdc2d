//! Tests for the `SourceRegistry`.
#![cfg(not(loom))]
#![allow(
    unfulfilled_lint_expectations,
    reason = "Needed for rustc suppressing false positives"
)]

use pushflow::{
    flow::{FlowController, Offer},
    registry::{SourceId, SourceRegistry},
};
use pushflow_testing::RecordingSink;
use rstest::{fixture, rstest};

mod common;
use common::TestResult;

#[expect(
    unused_braces,
    reason = "rustc false positive for single-line rstest fixtures"
)]
#[fixture]
fn registry() -> SourceRegistry<u8> { SourceRegistry::default() }

/// A registered source can be found and attached to while open.
#[rstest]
fn open_source_can_be_attached(registry: SourceRegistry<u8>) -> TestResult {
    let controller = FlowController::<u8>::builder().build()?;
    assert!(registry.register(&controller));
    controller.offer(9)?;

    let sink = RecordingSink::unbounded();
    assert!(registry.attach(&controller.id(), sink.as_sink()));
    assert_eq!(sink.received(), vec![9]);
    assert!(controller.is_bound());
    let found = registry
        .lookup(&controller.id())
        .ok_or("source should be open")?;
    assert_eq!(found.id(), controller.id());
    Ok(())
}

/// Lookups miss and sweep the entry once every controller handle is dropped.
#[rstest]
fn dropped_source_is_swept_on_lookup(registry: SourceRegistry<u8>) -> TestResult {
    let controller = FlowController::<u8>::builder().build()?;
    let id = controller.id();
    registry.register(&controller);
    drop(controller);

    assert!(registry.lookup(&id).is_none());
    assert!(registry.is_empty());
    Ok(())
}

/// A terminated source is closed even while handles to it survive.
#[rstest]
fn terminated_source_is_swept_on_lookup(registry: SourceRegistry<u8>) -> TestResult {
    let controller = FlowController::<u8>::builder().build()?;
    registry.register(&controller);
    controller.terminate();

    assert!(registry.lookup(&controller.id()).is_none());
    assert!(registry.is_empty());
    let sink = RecordingSink::unbounded();
    assert!(!registry.attach(&controller.id(), sink.as_sink()));
    assert!(!sink.is_bound());
    Ok(())
}

/// Terminated sources are refused at registration.
#[rstest]
fn terminated_source_is_not_registered(registry: SourceRegistry<u8>) -> TestResult {
    let controller = FlowController::<u8>::builder().build()?;
    controller.terminate();
    assert!(!registry.register(&controller));
    assert!(registry.is_empty());
    Ok(())
}

/// Retired sources are no longer found but keep running.
#[rstest]
fn retire_forgets_source(registry: SourceRegistry<u8>) -> TestResult {
    let controller = FlowController::<u8>::builder().build()?;
    registry.register(&controller);
    registry.retire(&controller.id());
    assert!(registry.lookup(&controller.id()).is_none());
    assert_eq!(controller.offer(1)?, Offer::Buffered);
    Ok(())
}

/// Listings skip and sweep dropped and terminated sources.
#[rstest]
fn open_listings_sweep_closed_entries(registry: SourceRegistry<u8>) -> TestResult {
    let live = FlowController::<u8>::builder().build()?;
    let dropped = FlowController::<u8>::builder().build()?;
    let finished = FlowController::<u8>::builder().build()?;
    registry.register(&live);
    registry.register(&dropped);
    registry.register(&finished);
    drop(dropped);
    finished.terminate();

    assert_eq!(registry.open_ids(), vec![live.id()]);
    assert_eq!(registry.len(), 1);
    let controllers = registry.open_controllers();
    assert_eq!(controllers.len(), 1);
    assert_eq!(controllers[0].id(), live.id());
    Ok(())
}

/// `sweep` drops closed entries without returning anything.
#[rstest]
fn sweep_removes_closed_entries(registry: SourceRegistry<u8>) -> TestResult {
    let dropped = FlowController::<u8>::builder().build()?;
    let finished = FlowController::<u8>::builder().build()?;
    registry.register(&dropped);
    registry.register(&finished);
    drop(dropped);
    finished.terminate();
    assert_eq!(registry.len(), 2);
    registry.sweep();
    assert!(registry.is_empty());
    Ok(())
}

/// Source identifiers are unique per controller.
#[rstest]
fn source_ids_are_unique() -> TestResult {
    let a = FlowController::<u8>::builder().build()?;
    let b = a.clone();
    let c = FlowController::<u8>::builder().build()?;
    assert_eq!(a.id(), b.id());
    assert_ne!(a.id(), c.id());
    assert_eq!(SourceId::new(7).to_string(), "SourceId(7)");
    assert_eq!(SourceId::from(7).as_u64(), 7);
    Ok(())
}
