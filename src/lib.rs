//! claude-history-sync - incremental upload of Claude conversation logs
//!
//! This crate provides the core functionality for the `claude-history-sync`
//! CLI tool.
//!
//! # Architecture
//!
//! - [`sync`] - Scanning, normalization, hashing, deltas, state and the run loop
//! - [`api`] - History service transport with bounded retries
//! - [`auth`] - Bearer credentials and token stores
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod sync;

pub use error::{Error, Result};
