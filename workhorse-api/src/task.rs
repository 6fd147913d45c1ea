use std::time::Duration;

use async_trait::async_trait;

use crate::types::CallResult;

/// A downstream operation that can be gated by an admission limiter.
///
/// Any resource an application wants to cap (a database, an HTTP endpoint, a
/// telemetry sink) is adapted to this shape. `C` is the per-call configuration
/// the operation needs, for example a statement or a request.
#[async_trait]
pub trait RateLimitedTask<C: Send + 'static>: Send + Sync {
    type Output: Send;

    /// Whether the resource can currently accept calls at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Perform one call, giving up after `timeout`.
    async fn attempt_call(&self, config: C, timeout: Duration) -> CallResult<Self::Output>;
}
