//! berth library
//!
//! A local deployment orchestrator: classifies application directories,
//! hands each project an exclusive port, builds it and supervises its
//! process.

pub mod app;
pub mod deploy;
pub mod detect;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod ports;
pub mod scanner;
pub mod storage;
pub mod store;
pub mod sync;
pub mod utils;
pub mod workers;
