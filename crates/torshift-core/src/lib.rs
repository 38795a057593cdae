//! torshift Core Library
//!
//! Shared functionality for torshift components:
//! - Rotation configuration and hierarchical settings resolution
//! - Proxy endpoint parsing
//! - Tracing setup with stdout and file sinks
//! - Common error types

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::{
    ExhaustedPolicy, ProbeConfig, ProxyEndpoint, ProxyScheme, RestartWait, RetryPolicy,
    RotationConfig, Settings,
};
pub use error::{Error, Result};
