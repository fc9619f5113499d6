//! Infrastructure layer for cross-cutting concerns.
//!
//! Provides foundational infrastructure including:
//! - Configuration file loading and validation
//! - Error handling and result types
//! - File handles for images and exported artifacts
//! - PEM armor for exported and imported signatures

pub mod armor;
pub mod config;
pub mod error;
pub mod files;
