//! Shared utilities and common types for the API gateway.
//!
//! This crate provides common functionality used across all other crates:
//! - Symmetric encryption for secrets at rest (AES-256-GCM)
//! - Sanitization of sensitive fields before audit persistence
//! - Common validation logic

pub mod crypto;
pub mod sanitize;
pub mod validation;
