pub mod archival;
pub mod confidence;
pub mod config;
pub mod delta;
pub mod error;
pub mod event;
pub mod io;
pub mod learn;
pub mod paths;
pub mod report;
pub mod store;
pub mod sync;
pub mod validate;

pub use error::{PlaybookError, Result};
