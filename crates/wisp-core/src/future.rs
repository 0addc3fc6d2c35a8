//! Type-erased future aliases used at API boundaries (object-safety, or
//! simply to avoid naming an unnameable `async fn`/`async move {}` type).

use std::future::Future;
use std::pin::Pin;

/// A `'static`, not-necessarily-`Send` boxed future. The runtime in this
/// workspace is single-threaded per executor by design, so nothing here
/// requires `Send`; see [`crate::executor`] for the one place that does
/// (posting work from a foreign thread).
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A `Send` boxed future, used only at the `Executor::post` boundary.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
