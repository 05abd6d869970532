use thiserror::Error;

/// A pending wait (or a [`watch`](crate::watch) step built on one) was aborted
/// through its cancellation token before its condition was satisfied.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;
