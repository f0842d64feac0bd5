//! Server module for building HTTP servers with generated resource routes
//!
//! This module provides a `ServerBuilder` that registers:
//! - the REST routes of every declared resource
//! - `/openapi.json` reflecting the same configuration
//! - health check routes

pub mod builder;
pub mod exposure;
pub mod openapi;
pub mod registry;
pub mod resource;

pub use builder::ServerBuilder;
pub use registry::ResourceRegistry;
pub use resource::{ResourceConfig, ResourceContext, ResponseArgs};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`)
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
