mod client;
mod types;

pub use client::{BuildLocator, BuildkiteClient, DEFAULT_BASE_URL};
