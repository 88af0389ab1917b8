//! A Tokio-based request queue that launches asynchronous operations the moment
//! they are submitted and hands their results to a consumer in a fixed order,
//! with cooperative cancellation, graceful close and hard abort.
//!
//! Producers call [`RequestQueue::submit`], which never waits on the operation.
//! Consumers pull [`ResultRecord`]s from [`Results`], suspending while nothing
//! is in flight. Per-request failures are delivered as data, never as a failed
//! sequence.

mod config;
mod consumer;
mod error;
mod launcher;
mod queue;
mod record;
mod registry;
mod request;
mod signal;

pub use config::{AbortPolicy, QueueConfig, RemovalOrder, WaitStrategy};
pub use consumer::Results;
pub use error::{OperationError, QueueError};
pub use queue::RequestQueue;
pub use record::ResultRecord;
pub use registry::QueueState;
pub use request::{OperationFuture, RequestConfig, RequestDescriptor};
