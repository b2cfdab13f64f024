//! Cancellation utilities
//!
//! Caller-side handles for aborting a running conductor request.

use tokio_util::sync::CancellationToken;

/// A handle that can be used to request cancellation.
///
/// Cancelling stops in-flight provider reads and tool executions of the
/// request it was attached to; the request then ends with a `cancelled`
/// error event.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Handle that is also cancelled whenever `parent` is.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token to hand to a `ConductorRequest`.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Create a standalone cancel handle that can be shared across tasks.
pub fn new_cancel_handle() -> CancelHandle {
    CancelHandle::default()
}
