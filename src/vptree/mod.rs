//! An implementation of an immutable, flat-buffer vantage-point tree.

#![warn(missing_docs)]

mod builder;
pub(crate) mod constants;
pub mod distance;
mod index;
mod queue;
mod r#trait;
mod traversal;

pub use builder::VpTreeBuilder;
pub use index::{VpTree, VpTreeMetadata, VpTreeRef};
pub use r#trait::{SearchResults, VpTreeIndex};
pub use traversal::Node;

#[cfg(test)]
mod test;
