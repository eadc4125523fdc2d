//! Test utilities for `pushflow`.
//!
//! [`RecordingSink`] is a credit-based sink that keeps every delivered
//! message for later assertions, and [`LoggerHandle`] gives tests exclusive
//! access to the captured log output.
//!
//! ```rust
//! use pushflow::flow::FlowController;
//! use pushflow_testing::RecordingSink;
//!
//! let controller = FlowController::<u8>::builder().build().unwrap();
//! let sink = RecordingSink::new();
//! controller.bind(sink.as_sink());
//! controller.offer(1).unwrap();
//! sink.grant(1);
//! assert_eq!(sink.received(), vec![1]);
//! ```

pub mod logging;
pub mod sink;

pub use logging::{LoggerHandle, logger};
pub use sink::RecordingSink;
