// Unit tests for LikeBridge components
// These tests run against the in-memory adapters, without Redis or PostgreSQL

pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod service;
