// ABOUTME: Type-safe identifiers and validated resource names.
// ABOUTME: Phantom-typed ids keep instance and target ids from being mixed up.

mod id;
mod resource_name;

pub use id::{InstanceId, TargetId};
pub use resource_name::{ResourceName, ResourceNameError};
