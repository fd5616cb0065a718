//! Per-invocation context handed to converters.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context for one conversion or bind.
///
/// Cloning is cheap; converters receive their own copy.
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    cancellation: CancellationToken,
    function_name: Option<Arc<str>>,
    invocation_id: Option<Uuid>,
}

impl ConversionContext {
    /// Creates a context with a fresh, never-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an external cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Records the function being invoked.
    pub fn with_function(mut self, name: impl Into<Arc<str>>) -> Self {
        self.function_name = Some(name.into());
        self
    }

    /// Records the invocation id.
    pub fn with_invocation_id(mut self, id: Uuid) -> Self {
        self.invocation_id = Some(id);
        self
    }

    /// The cancellation token for this invocation.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once the invocation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The function being invoked, if known.
    pub fn function_name(&self) -> Option<&str> {
        self.function_name.as_deref()
    }

    /// The invocation id, if known.
    pub fn invocation_id(&self) -> Option<Uuid> {
        self.invocation_id
    }
}
