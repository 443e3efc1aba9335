//! Invocation routing: the dispatcher and its per-principal concurrency cap

pub mod concurrency;
pub mod dispatcher;
pub mod types;

pub use concurrency::{AcquireError, ConcurrencyLimiter, ConcurrencyPermit};
pub use dispatcher::Dispatcher;
pub use types::*;
