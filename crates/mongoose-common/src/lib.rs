//! Common utilities for mongoose
//!
//! This crate provides the error taxonomy shared by the driver layer and the
//! HTTP gateway.

pub mod error;

pub use error::{GatewayError, Result};
