//! Immutable read/target descriptors and their SQL rendering.
//!
//! # Invariants
//! - A descriptor never changes after construction; limit overrides yield copies.
//! - The number of `?` placeholders in a predicate equals its argument count.

mod descriptor;
pub(crate) mod sql;

pub use descriptor::{Columns, QueryDescriptor};
