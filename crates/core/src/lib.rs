pub mod action;
pub mod config;
pub mod error;

pub use action::*;
pub use config::{SchedulerConfig, SchedulingStrategy};
pub use error::*;
