//! The platform-agnostic I/O reactor and handle layer: a completion
//! backend ([`backend::epoll::EpollBackend`] on Linux,
//! [`backend::poll::PollBackend`] as a portable fallback) behind the
//! [`backend::Backend`] seam, the unified async operation set on
//! [`context::IoContext`], and the RAII descriptor wrapper
//! [`handle::IoHandle`].
//!
//! Call [`reactor::install`] once per [`wisp_core::executor::LocalExecutor`]
//! at startup to get an [`context::IoContext`] to build handles on.

pub mod backend;
pub mod context;
pub mod descriptor;
pub mod endpoint;
pub mod handle;
pub mod reactor;
pub mod timer;

pub use context::IoContext;
pub use descriptor::{DescriptorKind, IoDescriptor};
pub use endpoint::IpEndpoint;
pub use handle::IoHandle;
pub use reactor::install;
