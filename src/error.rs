//! Error handling for flownet
//!
//! Structural mutations of a network return `Result<T>`; a rejected mutation
//! leaves the graph unchanged. Processor hooks report failures through
//! `ProcessorError`, which the evaluator routes to its exception handler
//! instead of propagating.

use crate::network::id::{InportId, OutportId, ProcessorId, PropertyId};
use thiserror::Error;

/// Main error type for network operations
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Unknown processor: {0}")]
    UnknownProcessor(ProcessorId),

    #[error("Unknown processor identifier: {0}")]
    UnknownIdentifier(String),

    #[error("Unknown inport: {0}")]
    UnknownInport(InportId),

    #[error("Unknown outport: {0}")]
    UnknownOutport(OutportId),

    #[error("Unknown port '{name}' on processor '{processor}'")]
    UnknownPortName { processor: String, name: String },

    #[error("Unknown property: {0}")]
    UnknownProperty(PropertyId),

    #[error("Unknown property path: {0}")]
    UnknownPropertyPath(String),

    /// Data types differ, or the consuming processor refused the outport
    #[error("Cannot connect {outport} ({outport_type}) to {inport} ({inport_type})")]
    IncompatiblePorts {
        outport: OutportId,
        inport: InportId,
        outport_type: &'static str,
        inport_type: &'static str,
    },

    #[error("Inport {inport} already has the maximum of {max} connection(s)")]
    ConnectionLimit { inport: InportId, max: usize },

    #[error("Processor '{processor}' declares port '{port}' more than once")]
    DuplicatePort { processor: String, port: String },

    #[error("Connection from {outport} to {inport} would create a cycle")]
    CycleDetected { outport: OutportId, inport: InportId },

    #[error("Cannot link property {0} to itself")]
    SelfLink(PropertyId),

    #[error("No converter from {src_class} to {dst_class}")]
    NoConverter { src_class: String, dst_class: String },

    #[error("Property {property} holds a {expected} value, got {found}")]
    ValueTypeMismatch {
        property: PropertyId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Processor '{0}' has too many ports or properties")]
    TooManyElements(String),

    #[error("Network cannot hold more than {0} processors")]
    TooManyProcessors(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<NetworkError>,
    },
}

impl NetworkError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        NetworkError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &NetworkError {
        match self {
            NetworkError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

/// Failure reported by a processor hook.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ProcessorError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProcessorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<NetworkError> for ProcessorError {
    fn from(err: NetworkError) -> Self {
        ProcessorError::with_source(err.to_string(), err)
    }
}
