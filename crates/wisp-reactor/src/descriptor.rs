//! [`IoDescriptor`] — the backend-owned record behind every registered fd:
//! an opaque, type-tagged handle created by the backend on registration
//! and destroyed on removal. A descriptor is registered in exactly one
//! I/O context for its lifetime.

use crate::backend::Token;

/// What kind of OS object a descriptor wraps. Informational only at this
/// layer (the backend treats every fd identically); consumers like
/// `wisp-http` use it to decide which high-level operations make sense.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind {
    Socket,
    File,
    Pipe,
    Tty,
    Pollable,
}

/// A registration token plus its kind. Never constructed directly —
/// obtained from [`crate::context::IoContext::add_descriptor`] and
/// consumed by [`crate::context::IoContext::remove_descriptor`].
pub struct IoDescriptor {
    pub(crate) token: Token,
    kind: DescriptorKind,
}

impl IoDescriptor {
    pub(crate) fn new(token: Token, kind: DescriptorKind) -> Self {
        IoDescriptor { token, kind }
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }
}
