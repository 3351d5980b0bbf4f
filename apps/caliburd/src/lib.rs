//! # Caliburd Library
//!
//! Exposes the server and CLI modules for testing and integration.
//!
//! The binary uses these modules through the `main.rs` entry point.

pub mod account;
pub mod api;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod rpc;
pub mod wallet;

// Re-export calibur_core for convenience
pub use calibur_core;
