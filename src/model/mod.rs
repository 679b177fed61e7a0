//! Data model: class keys, provider ids and compilation units.

pub mod types;
pub mod unit;

pub use types::{ClassKey, ProviderId, ValidationError};
pub use unit::{CompilationUnit, Dialect, UnitRole};
