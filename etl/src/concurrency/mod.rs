//! Coordination primitives shared by the pipeline workers.

pub mod shutdown;
