//! Edge value types: data connections and property links.

use crate::network::converter::ConverterHandle;
use crate::network::id::{InportId, OutportId, ProcessorId, PropertyId};
use std::fmt;

/// Data-flow edge from an outport to an inport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Connection {
    pub outport: OutportId,
    pub inport: InportId,
}

impl Connection {
    pub fn new(outport: OutportId, inport: InportId) -> Self {
        Self { outport, inport }
    }

    pub fn producer(&self) -> ProcessorId {
        self.outport.processor()
    }

    pub fn consumer(&self) -> ProcessorId {
        self.inport.processor()
    }

    pub fn involves(&self, processor: ProcessorId) -> bool {
        self.producer() == processor || self.consumer() == processor
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.outport, self.inport)
    }
}

/// One-way value-propagation edge between two properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyLink {
    pub source: PropertyId,
    pub destination: PropertyId,
}

impl PropertyLink {
    pub fn new(source: PropertyId, destination: PropertyId) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.destination, self.source)
    }

    pub fn involves(&self, processor: ProcessorId) -> bool {
        self.source.processor() == processor || self.destination.processor() == processor
    }

    /// Whether the link joins `a` and `b`, in either direction.
    pub fn is_between(&self, a: ProcessorId, b: ProcessorId) -> bool {
        let (src, dst) = (self.source.processor(), self.destination.processor());
        (src == a && dst == b) || (src == b && dst == a)
    }
}

impl fmt::Display for PropertyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// A link annotated with the converter that moves values across it.
/// Computed by the link evaluator, never authored directly.
#[derive(Clone)]
pub struct ConvertibleLink {
    pub source: PropertyId,
    pub destination: PropertyId,
    pub converter: ConverterHandle,
}

impl ConvertibleLink {
    pub fn link(&self) -> PropertyLink {
        PropertyLink::new(self.source, self.destination)
    }
}

impl fmt::Debug for ConvertibleLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvertibleLink")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("converter", &self.converter.name())
            .finish()
    }
}
