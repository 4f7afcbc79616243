mod creator;
mod runner;

pub use creator::{SchemaAgent, meta_schema};
pub use runner::{InferenceOutput, InferenceRequest, InferenceRunner};
