#![doc = include_str!("../README.md")]

mod error;
pub mod points;
mod r#type;
pub mod vptree;

pub use error::MetricIndexError;
pub use r#type::{CoordType, IndexableFloat};

#[cfg(test)]
pub(crate) mod test;
