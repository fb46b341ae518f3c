// Common test utilities for integration tests


pub use containers::{start_postgres, start_redis, DOCKER};
