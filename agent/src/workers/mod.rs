//! Background workers

pub mod deployer;
pub mod log_writer;
pub mod poller;
