//! Resource identity and kind registry.
//!
//! Every object the controller watches is reduced to an [`Identity`] and
//! classified into one of a small number of [`Role`]s. The registry in
//! [`kind`] is the single table that decides, for each `(group, kind)`, which
//! role the object plays and which rule judges its events.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod classify;
mod identity;
pub mod kind;
pub mod refs;

pub use self::{
    classify::{Classified, Fields},
    identity::{GroupKind, Identity, ObjectKey},
    kind::{KindInfo, Role, Scope, Trigger},
    refs::{ObjectRef, ParentRef, TargetRef},
};

/// Fails classification of an observed object.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown kind {0}")]
    UnknownKind(GroupKind),

    #[error("malformed {kind} {name:?}: {reason}")]
    MalformedObject {
        kind: GroupKind,
        name: String,
        reason: String,
    },
}

impl Error {
    pub fn malformed(kind: GroupKind, name: impl ToString, reason: impl ToString) -> Self {
        Self::MalformedObject {
            kind,
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// A short label suitable for a metric dimension.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnknownKind(_) => "unknown_kind",
            Self::MalformedObject { .. } => "malformed",
        }
    }
}
