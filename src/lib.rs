pub mod agent;
pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
