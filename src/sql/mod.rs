//! Safe SQL builder: identifiers quoted, values as parameters.

mod builder;
pub mod columns;
pub mod params;
pub use builder::*;
pub use columns::{ColumnKind, ColumnTypes};
pub use params::*;
