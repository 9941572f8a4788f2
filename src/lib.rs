#![forbid(unsafe_code)]

pub mod calendar;
pub mod clock;
pub mod config;
pub mod deadline;
pub mod errors;
pub mod extract;
pub mod messaging;
pub mod models;
pub mod monitor;
pub mod persistence;
pub mod portal;
pub mod scheduler;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
