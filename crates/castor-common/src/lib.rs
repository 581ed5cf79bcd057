//! Castor common types, errors, and the type system.
//!
//! This crate provides shared definitions used across all castor components.

pub mod config;
pub mod error;
pub mod types;
pub mod typesystem;

pub use config::{CasConfig, DEFAULT_HEAP_PAGE_SIZE, MIN_HEAP_PAGE_SIZE};
pub use error::{CasError, ErrorKind, Result};
pub use types::{FeatureCode, FsRef, TypeClass, TypeCode};
pub use typesystem::{FeatureInfo, TypeInfo, TypeSystem};
