mod client;
mod types;

pub use client::{status_table, CircleCiClient, DEFAULT_BASE_URL};
