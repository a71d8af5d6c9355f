//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Temporary database fixtures and test configuration
//! - An in-process mock of the server
//! - Fake camera and polling helpers

pub mod database;
pub mod devices;
pub mod mock_remote;

// Re-export commonly used utilities
pub use database::*;
pub use devices::*;
pub use mock_remote::*;
