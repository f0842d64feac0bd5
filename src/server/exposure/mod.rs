//! API exposure of registered resources
//!
//! Each resource is exposed over REST; the OpenAPI reflection of the same
//! resources lives in [`crate::server::openapi`].

pub mod rest;

pub use rest::RestExposure;
