//! Utilities shared by the Pipedeck packages: logging setup and the clock abstraction.

pub mod logger;
pub mod time;
