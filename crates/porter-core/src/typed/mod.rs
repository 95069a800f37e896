//! Typed - task definitions, argument codec and the registry.
//!
//! # Two layers
//! - **typed**: ordinary Rust functions and `FromValue` / `IntoResults`
//! - **dyn**: `DynTask`, object-safe, what the registry stores

pub mod codec;
pub mod registry;
pub mod task;

pub use self::codec::CodecError;
pub use self::registry::{TaskRegistry, Tasks};
pub use self::task::{
    DynTask, FromValue, IntoResults, IntoTask, IntoValue, RegisteredTask, TaskError,
};
