//! Application initialization and resource setup.
//!
//! This module provides functions to initialize shared resources:
//! - Logger (plain or JSON)
//! - HTTP clients (direct and proxied)
//! - DNS resolver
//!
//! The database pool lives in [`crate::storage`].

mod client;
mod logger;
mod resolver;

pub use client::{init_client, init_proxied_client};
pub use logger::init_logger_with;
pub use resolver::init_resolver;
