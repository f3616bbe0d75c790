//! Dataflow network evaluation core.
//!
//! Processors connected by typed ports form a DAG that is evaluated lazily:
//! invalidating a processor marks it and everything downstream, and an
//! evaluation pass re-runs exactly those processors, producers first.
//! Independently, property links form a (possibly cyclic) graph over
//! properties along which value changes are propagated, each destination at
//! most once per change.
//!
//! # Architecture
//!
//! ```text
//! ProcessorNetwork ── owns ──► ProcessorArena ──► ProcessorSlot
//!        │                                        ├─ Box<dyn Processor>
//!        │                                        ├─ Inport / Outport
//!        │                                        └─ Property tree
//!        ├── Evaluator       (schedule + run passes)
//!        └── LinkEvaluator   (link caches + propagation guard)
//! ```
//!
//! # Design
//!
//! - **Arena ownership**: ports, connections and links only hold `Copy`
//!   handles (`InportId`, `OutportId`, `PropertyId`) into the arena.
//! - **Edge-triggered invalidation**: invalidating at or below the stored
//!   level does nothing; port callbacks fire once per transition.
//! - **Network lock**: evaluation requested while locked runs once, when the
//!   outermost lock is released.
//! - **Hook isolation**: a failing processor is reported to the exception
//!   handler and the pass continues.

pub mod arena;
pub mod connection;
pub mod context;
pub mod converter;
pub mod evaluator;
pub mod graph;
pub mod id;
pub mod link_evaluator;
#[allow(clippy::module_inception)]
pub mod network;
pub mod observer;
pub mod port;
pub mod processor;
pub mod property;
pub mod state;

pub use arena::ProcessorArena;
pub use connection::{Connection, ConvertibleLink, PropertyLink};
pub use context::{ProcessContext, ProcessorRequest};
pub use converter::{ConverterHandle, ConverterRegistry, PropertyConverter};
pub use evaluator::{
    EvaluationReport, EvaluationType, Evaluator, ExceptionContext, ExceptionHandler,
};
pub use graph::{EvaluationPlan, PlanStats};
pub use id::{InportId, ObserverId, OutportId, ProcessorId, PropertyId};
pub use link_evaluator::LinkEvaluator;
pub use network::{NetworkLock, ProcessorNetwork};
pub use observer::NetworkObserver;
pub use port::{DataType, Inport, Outport, PortData, PortDescriptor, PortDirection, ReadyState};
pub use processor::{InvalidationLevel, Processor, ProcessorSlot};
pub use property::{Property, PropertyDescriptor, PropertyValue};
pub use state::StateCoordinator;
