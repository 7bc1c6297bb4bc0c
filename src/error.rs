//! Error types for the context stack.

use crate::store::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Model (schema) loading and validation errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid model definition: {0}")]
    Parse(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Unknown property '{property}' on entity '{entity}'")]
    UnknownProperty { entity: String, property: String },

    #[error("Property '{property}' on entity '{entity}' expects {expected}, got {found}")]
    TypeMismatch {
        entity: String,
        property: String,
        expected: String,
        found: String,
    },
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open store at {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Store was written for model {found}, expected {expected}")]
    IncompatibleModel { expected: String, found: String },

    #[error("Coordinator already has a store attached")]
    AlreadyAttached,

    #[error("Coordinator has no store attached")]
    NoStore,

    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Failed to erase store at {path:?}: {source}")]
    Erase {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store data error: {0}")]
    Data(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised by context operations, including commit
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Object not found in context: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Object {0} is deleted in this context")]
    ObjectDeleted(ObjectId),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Stack construction and configuration errors
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("A main stack is already installed")]
    MainStackAlreadySet,

    #[error("Primary thread did not run the context creation")]
    PrimaryUnavailable,

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Store open failed: {0}")]
    StoreOpen(#[from] StoreError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),
}

impl From<config::ConfigError> for StackError {
    fn from(err: config::ConfigError) -> Self {
        StackError::Configuration(err.to_string())
    }
}
