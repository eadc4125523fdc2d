#![cfg_attr(loom, allow(missing_docs))]
#![cfg(not(loom))]
//! Shared fixtures for integration tests.

use pushflow::flow::{FlowController, FlowControllerBuilder};

/// Returns a builder with an unbounded buffer for reuse across tests.
#[must_use]
pub fn builder<M: Send + 'static>() -> FlowControllerBuilder<M> {
    FlowController::<M>::builder().unbounded()
}
