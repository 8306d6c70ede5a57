mod client;
mod config;
mod error;

pub use client::{CheckResponse, Diagnostic, FgaClient, Store, TupleKey};
pub use config::ClientOptions;
pub use error::ClientError;
