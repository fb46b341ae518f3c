pub mod broker;
pub mod cache;
pub mod config;
pub mod dlq;
pub mod error;
pub mod health;
pub mod jobs;
pub mod kv;
pub mod metrics;
pub mod models;
pub mod processor;
pub mod service;
pub mod store;

pub use error::{LikeBridgeError, Result};
