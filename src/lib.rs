//! # flownet: dataflow network evaluation
//!
//! A graph of processors wired through typed ports, evaluated incrementally
//! from an invalidation state machine, plus a property-link graph that keeps
//! linked property values in sync even across cyclic link topologies.
//!
//! ## Architecture
//!
//! - **Network**: owns processors, connections and links; the only entry
//!   point for structural mutations
//! - **Evaluator**: visits invalid processors in dependency order
//! - **LinkEvaluator**: caches the link graph and propagates converted values
//! - **Config**: TOML settings for evaluation limits, auto-linking and logging
//!
//! ## Example
//!
//! ```ignore
//! use flownet::{InvalidationLevel, ProcessorNetwork};
//!
//! let mut network = ProcessorNetwork::new();
//! let source = network.add(NumberSource::new(2.0))?;
//! let sink = network.add(Printer::default())?;
//! network.add_connection(
//!     network.require_outport(source, "out")?,
//!     network.require_inport(sink, "in")?,
//! )?;
//!
//! // Batch several edits into one evaluation pass.
//! {
//!     let mut locked = network.locked();
//!     locked.invalidate(source, InvalidationLevel::InvalidOutput);
//!     locked.invalidate(sink, InvalidationLevel::InvalidResources);
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;

// Re-export commonly used types
pub use config::NetworkSettings;
pub use error::{NetworkError, ProcessorError, Result, ResultExt};
pub use network::{
    Connection, EvaluationReport, EvaluationType, ExceptionContext, InportId, InvalidationLevel,
    NetworkLock, NetworkObserver, OutportId, PortDescriptor, ProcessContext, Processor,
    ProcessorId, ProcessorNetwork, PropertyDescriptor, PropertyId, PropertyLink, PropertyValue,
};
