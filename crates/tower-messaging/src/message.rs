//! # Message Types
//!
//! Any `Clone + Send + Sync + 'static` value can travel through a broker.
//! Message identity is the Rust type itself: two publishes of the same type
//! under the same scope reach the same broker.

use serde::{Deserialize, Serialize};
use std::any::TypeId;

/// Marker trait for values that can be published.
///
/// Implemented automatically for every eligible type. Each handler receives
/// its own clone of the published value, so large payloads should be wrapped
/// in an `Arc`.
pub trait Message: Clone + Send + Sync + 'static {}

impl<T> Message for T where T: Clone + Send + Sync + 'static {}

/// Zero-size message used by the anonymous ("signal") channel.
///
/// Publishing an `AnonMessage` carries nothing but the occurrence itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnonMessage;

/// Runtime identity of a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKind {
    type_id: TypeId,
    name: &'static str,
}

impl MessageKind {
    /// Identity of `M`.
    #[must_use]
    pub fn of<M: Message>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name, for diagnostics only.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this is the anonymous channel.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.type_id == TypeId::of::<AnonMessage>()
    }
}
