//! # dashlink-core
//!
//! Core crate for dashlink. Contains the configuration schemas, the
//! endpoint builder, and the unified error system.
//!
//! This crate has **no** internal dependencies on other dashlink crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
