//! The three polling stages and the handle used to wait on them.

pub mod base;
pub mod extract;
pub mod load;
pub mod transform;
