//! Small shared utilities.

pub mod cancel;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
