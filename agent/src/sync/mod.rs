//! Projects directory synchronization

pub mod syncer;
