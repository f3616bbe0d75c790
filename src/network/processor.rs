//! Processor abstraction.
//!
//! A `Processor` is the opaque unit of computation the network evaluates. It
//! declares its ports and properties once; the network stores the runtime
//! state for them in a `ProcessorSlot` next to the boxed processor.

use crate::error::{NetworkError, ProcessorError, Result};
use crate::network::context::ProcessContext;
use crate::network::id::{InportId, OutportId, ProcessorId, PropertyId};
use crate::network::port::{Inport, Outport, PortDescriptor, PortDirection};
use crate::network::property::{Property, PropertyDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Pending recomputation requirement, in ascending severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum InvalidationLevel {
    #[default]
    Valid,
    InvalidOutput,
    InvalidResources,
}

impl InvalidationLevel {
    pub fn is_valid(self) -> bool {
        self == InvalidationLevel::Valid
    }
}

impl fmt::Display for InvalidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvalidationLevel::Valid => "Valid",
            InvalidationLevel::InvalidOutput => "InvalidOutput",
            InvalidationLevel::InvalidResources => "InvalidResources",
        };
        f.write_str(s)
    }
}

/// A node of the dataflow network.
pub trait Processor {
    /// Type name, used to derive the default identifier.
    fn class_identifier(&self) -> &str;

    fn display_name(&self) -> &str {
        self.class_identifier()
    }

    /// Port declarations. Called once when the processor is added.
    fn ports(&self) -> Vec<PortDescriptor> {
        Vec::new()
    }

    /// Property declarations. Called once when the processor is added.
    fn properties(&self) -> Vec<PropertyDescriptor> {
        Vec::new()
    }

    /// Recreate resources. Runs before `process` when the processor was
    /// invalidated with `InvalidResources`.
    fn initialize_resources(&mut self, _ctx: &mut ProcessContext<'_>) -> std::result::Result<(), ProcessorError> {
        Ok(())
    }

    /// Compute outputs from inputs and properties.
    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> std::result::Result<(), ProcessorError>;

    /// Called instead of `process` when the processor is not ready.
    fn do_if_not_ready(&mut self, _ctx: &mut ProcessContext<'_>) {}

    /// Readiness given whether every inport is ready.
    fn is_ready(&self, inports_ready: bool) -> bool {
        inports_ready
    }

    /// Extra acceptance check for a connection into `inport`, applied after
    /// the data type check.
    fn can_connect_to(&self, _inport: &str, _outport: &PortDescriptor) -> bool {
        true
    }

    /// Readiness of one of this processor's outports.
    fn is_outport_ready(&self, _outport: &str, has_data: bool) -> bool {
        has_data
    }
}

/// Storage for a processor and the runtime state of its ports and properties.
pub struct ProcessorSlot {
    /// Taken out while one of its hooks runs.
    pub(crate) processor: Option<Box<dyn Processor>>,
    id: ProcessorId,
    identifier: String,
    display_name: String,
    class_identifier: String,
    pub(crate) inports: Vec<Inport>,
    pub(crate) outports: Vec<Outport>,
    pub(crate) properties: Vec<Property>,
    /// Roots of the property tree, in declaration order.
    top_level_properties: Vec<PropertyId>,
    pub(crate) invalidation_level: InvalidationLevel,
}

impl ProcessorSlot {
    pub(crate) fn new(
        id: ProcessorId,
        identifier: String,
        processor: Box<dyn Processor>,
    ) -> Result<Self> {
        let ports = processor.ports();
        let descriptors = processor.properties();
        let property_count: usize = descriptors.iter().map(PropertyDescriptor::tree_size).sum();
        if ports.len() > InportId::MAX_ELEMENTS || property_count > PropertyId::MAX_ELEMENTS {
            return Err(NetworkError::TooManyElements(identifier));
        }

        let mut seen = HashSet::new();
        for port in &ports {
            if !seen.insert(port.name.as_str()) {
                return Err(NetworkError::DuplicatePort {
                    processor: identifier,
                    port: port.name.clone(),
                });
            }
        }

        let mut inports = Vec::new();
        let mut outports = Vec::new();
        for port in ports {
            match port.direction {
                PortDirection::Input => {
                    let port_id = InportId::new(id, inports.len() as u16);
                    inports.push(Inport::new(port_id, port));
                }
                PortDirection::Output => {
                    let port_id = OutportId::new(id, outports.len() as u16);
                    outports.push(Outport::new(port_id, port));
                }
            }
        }

        let mut properties = Vec::with_capacity(property_count);
        let top_level_properties: Vec<PropertyId> = descriptors
            .into_iter()
            .map(|descriptor| Property::flatten(id, descriptor, None, &mut properties))
            .collect();

        Ok(Self {
            id,
            display_name: processor.display_name().to_string(),
            class_identifier: processor.class_identifier().to_string(),
            identifier,
            processor: Some(processor),
            inports,
            outports,
            properties,
            top_level_properties,
            invalidation_level: InvalidationLevel::Valid,
        })
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn class_identifier(&self) -> &str {
        &self.class_identifier
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.invalidation_level
    }

    pub fn is_valid(&self) -> bool {
        self.invalidation_level.is_valid()
    }

    /// A processor without outports.
    pub fn is_sink(&self) -> bool {
        self.outports.is_empty()
    }

    /// A processor without inports.
    pub fn is_source(&self) -> bool {
        self.inports.is_empty()
    }

    pub fn inports(&self) -> &[Inport] {
        &self.inports
    }

    pub fn outports(&self) -> &[Outport] {
        &self.outports
    }

    pub fn inport(&self, name: &str) -> Option<&Inport> {
        self.inports.iter().find(|p| p.identifier() == name)
    }

    pub fn outport(&self, name: &str) -> Option<&Outport> {
        self.outports.iter().find(|p| p.identifier() == name)
    }

    /// All properties, flattened depth first.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn top_level_properties(&self) -> &[PropertyId] {
        &self.top_level_properties
    }

    /// Resolve a path of identifiers through the property tree.
    pub fn property_by_path<S: AsRef<str>>(&self, path: &[S]) -> Option<PropertyId> {
        let (first, rest) = path.split_first()?;
        let mut current = *self
            .top_level_properties
            .iter()
            .find(|&&id| self.properties[id.index()].identifier() == first.as_ref())?;
        for segment in rest {
            current = *self.properties[current.index()]
                .children()
                .iter()
                .find(|&&id| self.properties[id.index()].identifier() == segment.as_ref())?;
        }
        Some(current)
    }

    /// `id` and every property below it, depth first.
    pub fn property_subtree(&self, id: PropertyId) -> Vec<PropertyId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(prop) = self.properties.get(current.index()) {
                out.push(current);
                stack.extend(prop.children().iter().rev().copied());
            }
        }
        out
    }

    pub(crate) fn set_identifier(&mut self, identifier: String) {
        self.identifier = identifier;
    }

    /// Downcast-free access to the boxed processor.
    pub fn processor(&self) -> Option<&dyn Processor> {
        self.processor.as_deref()
    }
}

impl fmt::Debug for ProcessorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorSlot")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("level", &self.invalidation_level)
            .field("inports", &self.inports.len())
            .field("outports", &self.outports.len())
            .field("properties", &self.properties.len())
            .finish()
    }
}

/// Split a trailing number off an identifier: `"Source 2"` → `("Source", Some(2))`.
pub(crate) fn split_numeric_suffix(identifier: &str) -> (&str, Option<u32>) {
    if let Some((base, suffix)) = identifier.rsplit_once(' ') {
        if let Ok(n) = suffix.parse::<u32>() {
            return (base, Some(n));
        }
    }
    (identifier, None)
}
