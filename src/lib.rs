mod compare;
mod depth;
mod error;
mod rbtree;

pub use crate::compare::{Comparator, Lexical, Natural};
pub use crate::depth::Depth;
pub use crate::error::RbError;
pub use crate::rbtree::{Rbtree, Stats};

#[cfg(test)]
mod rbtree_test;
