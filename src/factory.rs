use async_trait::async_trait;

/// Creates, validates and destroys the handles a [`Pool`](crate::pool::Pool) manages.
///
/// The pool never looks inside a handle; every lifecycle step goes through
/// this trait. Calls are made outside the pool's bookkeeping lock, so slow
/// network I/O here does not stall unrelated borrows or releases.
///
/// ```rust
/// use async_trait::async_trait;
/// use client_pool::factory::Factory;
///
/// struct Counter;
///
/// #[async_trait]
/// impl Factory for Counter {
///     type Handle = u32;
///     type Error = std::io::Error;
///
///     async fn create(&self) -> Result<u32, std::io::Error> {
///         Ok(7)
///     }
/// }
/// ```
#[async_trait]
pub trait Factory: Send + Sync + 'static {
    type Handle: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new handle to the remote service.
    async fn create(&self) -> Result<Self::Handle, Self::Error>;

    /// Liveness check. A `false` answer makes the pool destroy the handle.
    async fn validate(&self, _handle: &mut Self::Handle) -> bool {
        true
    }

    /// Release the handle's underlying resources.
    ///
    /// Errors are logged by the pool and otherwise ignored.
    async fn destroy(&self, handle: Self::Handle) -> Result<(), Self::Error> {
        drop(handle);
        Ok(())
    }
}
