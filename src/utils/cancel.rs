//! Cooperative cancellation for caller-tied async work.
//!
//! [`cancel_pair`] returns a handle kept by the caller and a token passed to
//! the operation. The operation polls [`CancelToken::is_cancelled`] right
//! before each observable effect and abandons the remainder when the flag is
//! set. Cancellation is advisory; in-flight awaits are not interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Caller-side handle that requests cancellation.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Operation-side view of the cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A linked handle/token pair sharing one flag.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let flag = Arc::new(AtomicBool::new(false));
    (
        CancelHandle { flag: flag.clone() },
        CancelToken { flag },
    )
}
