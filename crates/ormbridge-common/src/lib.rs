//! Common utilities for ormbridge
//!
//! This crate provides the error taxonomy shared by every ormbridge backend.

pub mod error;

pub use error::{AdapterError, Result};
