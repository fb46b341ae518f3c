// Integration tests for LikeBridge
// These tests start Redis and PostgreSQL containers and need a Docker daemon

pub mod common;
