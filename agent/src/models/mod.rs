//! Data model shared by the store, the allocator and the supervisor

pub mod deployment;
pub mod log;
pub mod port;
pub mod project;
