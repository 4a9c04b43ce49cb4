//! Activate-on-demand trigger.
//!
//! Decodes an inbound activation event, applies the time-of-day gate and
//! converges the managed service to running when a client shows up.
//! The `waker-launcher` binary hosts one invocation per process.

pub mod event;
pub mod handler;

pub use event::{decode_log_data, ActivationEvent, EventError, LogRecord, LogsDocument};
pub use handler::{Clock, SystemClock, TriggerHandler, TriggerOutcome};
