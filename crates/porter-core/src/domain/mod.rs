//! Domain model: wire arguments, native values, jobs and result records.

pub mod argument;
pub mod job;
pub mod value;

pub use self::argument::{Argument, Signature, TypeTag};
pub use self::job::{JobResponse, ResultRecord};
pub use self::value::{NormalizedValue, Value, ValueKind};
