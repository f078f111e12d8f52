//! Trigger registry: named failure markers and their remediation callbacks.
//!
//! A trigger is a literal substring that identifies a known failure in a log
//! message. The registry keeps triggers in declaration order, which is also
//! the tie-break when more than one substring matches a message.

/// Callback seam and the context passed to callbacks.
pub mod callback;
/// Built-in trigger catalog.
pub mod catalog;
/// Registry storage and resolution.
pub mod registry;

pub use callback::{InvocationContext, SharedCallback, TriggerCallback};
pub use catalog::BUILTIN_TRIGGERS;
pub use registry::{TriggerDefinition, TriggerRegistry, UNKNOWN_TRIGGER};
