//! torshift Daemon Library
//!
//! Core functionality for periodic Tor identity rotation:
//! - Proxy service control through systemd
//! - Preflight gate on the proxy service state
//! - Exit address verification with fixed-delay retries
//! - Tracked, non-blocking proxy restarts
//! - Signal-driven cooperative cancellation
//! - The rotation control loop

pub mod identity;
pub mod preflight;
pub mod restart;
pub mod rotation;
pub mod service;
pub mod signals;

#[cfg(test)]
mod testing;
