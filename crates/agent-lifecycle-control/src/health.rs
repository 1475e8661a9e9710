//! Composable health checks.
//!
//! The agent's own check is a pure state gate. Concrete agents add their
//! dependency checks by chaining them after it:
//!
//! ```
//! use agent_lifecycle_control::{
//!     AgentBuilder, FnHealthCheck, HealthCheck, HealthCheckExt, HookError,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> agent_lifecycle_control::Result<()> {
//! let agent = AgentBuilder::new("a1", "svc", "1.0.0").build()?;
//! let check = agent.and_then(FnHealthCheck::new("database", |_ctx: CancellationToken| async {
//!     Ok::<(), HookError>(())
//! }));
//!
//! let ctx = CancellationToken::new();
//! check.check(&ctx).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use agent_lifecycle_core::{HookError, LifecycleError, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;

/// Something that can report whether it is healthy.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Run the check.
    ///
    /// # Errors
    ///
    /// Returns an `Unavailable`-kind error when unhealthy.
    async fn check(&self, ctx: &CancellationToken) -> Result<()>;
}

#[async_trait]
impl HealthCheck for Agent {
    async fn check(&self, _ctx: &CancellationToken) -> Result<()> {
        self.health()
    }
}

#[async_trait]
impl<T: HealthCheck + ?Sized> HealthCheck for Arc<T> {
    async fn check(&self, ctx: &CancellationToken) -> Result<()> {
        (**self).check(ctx).await
    }
}

/// Runs `base` first and `dependency` only if `base` passed.
#[derive(Debug, Clone)]
pub struct Chained<B, D> {
    base: B,
    dependency: D,
}

#[async_trait]
impl<B: HealthCheck, D: HealthCheck> HealthCheck for Chained<B, D> {
    async fn check(&self, ctx: &CancellationToken) -> Result<()> {
        self.base.check(ctx).await?;
        self.dependency.check(ctx).await
    }
}

/// Combinators for [`HealthCheck`].
pub trait HealthCheckExt: HealthCheck + Sized {
    /// Check `dependency` after `self` has passed.
    fn and_then<D: HealthCheck>(self, dependency: D) -> Chained<Self, D> {
        Chained {
            base: self,
            dependency,
        }
    }
}

impl<T: HealthCheck> HealthCheckExt for T {}

/// A named dependency check backed by a closure.
///
/// Failures are reported as `LifecycleError::Dependency` carrying the name.
pub struct FnHealthCheck<F> {
    name: String,
    probe: F,
}

impl<F> FnHealthCheck<F> {
    /// Wrap `probe` as the check for dependency `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, probe: F) -> Self {
        Self {
            name: name.into(),
            probe,
        }
    }

    /// Name of the dependency.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<F, Fut> HealthCheck for FnHealthCheck<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), HookError>> + Send + 'static,
{
    async fn check(&self, ctx: &CancellationToken) -> Result<()> {
        (self.probe)(ctx.clone())
            .await
            .map_err(|err| LifecycleError::Dependency {
                name: self.name.clone(),
                reason: err.to_string(),
            })
    }
}
