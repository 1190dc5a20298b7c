//! Core types and traits for xm2toot
//!
//! This crate provides the message bus shared by the bridge tasks, the
//! configuration schema and loader, logging setup and the stop signal.

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
pub mod shutdown;
pub mod utils;

pub use error::{Error, Result};
pub use shutdown::StopSignal;
