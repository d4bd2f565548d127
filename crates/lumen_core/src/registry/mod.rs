//! # Registries
//!
//! Shared collections mutated from several threads:
//! - [`KeyedRegistry`]: key to value association with generation-tagged keys
//! - [`OrderedList`]: insertion-ordered elements with skip flags

mod keyed;
mod ordered;

pub use keyed::KeyedRegistry;
pub use ordered::{Nested, NestedNode, OrderedList};
