//! Context handed to processor hooks.

use crate::error::ProcessorError;
use crate::network::arena::ProcessorArena;
use crate::network::id::{OutportId, ProcessorId, PropertyId};
use crate::network::port::PortData;
use crate::network::processor::{InvalidationLevel, ProcessorSlot};
use crate::network::property::PropertyValue;
use std::any::Any;
use std::sync::Arc;

/// Deferred mutation issued by a processor while its hook runs. Applied by
/// the network once the hook has returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorRequest {
    SetProperty {
        property: PropertyId,
        value: PropertyValue,
    },
    Invalidate {
        processor: ProcessorId,
        level: InvalidationLevel,
    },
}

/// View of the network from inside one processor's hook.
///
/// Reads go straight to the arena. Outport writes are applied immediately
/// since nothing downstream runs until the hook returns. Property writes and
/// invalidations are queued as `ProcessorRequest`s.
pub struct ProcessContext<'a> {
    arena: &'a mut ProcessorArena,
    id: ProcessorId,
    requests: Vec<ProcessorRequest>,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(arena: &'a mut ProcessorArena, id: ProcessorId) -> Self {
        Self {
            arena,
            id,
            requests: Vec::new(),
        }
    }

    pub fn processor_id(&self) -> ProcessorId {
        self.id
    }

    fn slot(&self) -> Option<&ProcessorSlot> {
        self.arena.get(self.id)
    }

    pub fn identifier(&self) -> &str {
        self.slot().map(ProcessorSlot::identifier).unwrap_or_default()
    }

    fn unknown_port(&self, name: &str) -> ProcessorError {
        ProcessorError::new(format!(
            "processor '{}' has no port '{}'",
            self.identifier(),
            name
        ))
    }

    fn connected_data(&self, name: &str) -> Vec<(OutportId, PortData)> {
        let Some(port) = self.slot().and_then(|slot| slot.inport(name)) else {
            return Vec::new();
        };
        port.connected_outports()
            .iter()
            .filter_map(|&out| {
                let data = self.arena.outport(out)?.data()?.clone();
                Some((out, data))
            })
            .collect()
    }

    /// Data from the first connected outport that has data of type `T`.
    pub fn input<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.connected_data(name)
            .into_iter()
            .find_map(|(_, data)| data.downcast::<T>().ok())
    }

    /// Data from every connected outport, in connection order.
    pub fn inputs<T: Any + Send + Sync>(&self, name: &str) -> Vec<Arc<T>> {
        self.connected_data(name)
            .into_iter()
            .filter_map(|(_, data)| data.downcast::<T>().ok())
            .collect()
    }

    /// Only the data whose producer changed since the last `process`.
    pub fn changed_inputs<T: Any + Send + Sync>(&self, name: &str) -> Vec<Arc<T>> {
        let changed = self.changed_outports(name);
        self.connected_data(name)
            .into_iter()
            .filter(|(out, _)| changed.contains(out))
            .filter_map(|(_, data)| data.downcast::<T>().ok())
            .collect()
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.slot()
            .and_then(|slot| slot.inport(name))
            .is_some_and(|port| port.is_connected())
    }

    pub fn is_changed(&self, name: &str) -> bool {
        self.slot()
            .and_then(|slot| slot.inport(name))
            .is_some_and(|port| port.is_changed())
    }

    pub fn changed_outports(&self, name: &str) -> Vec<OutportId> {
        self.slot()
            .and_then(|slot| slot.inport(name))
            .map(|port| port.changed_outports().to_vec())
            .unwrap_or_default()
    }

    pub fn is_inport_ready(&self, name: &str) -> bool {
        self.slot()
            .and_then(|slot| slot.inport(name))
            .is_some_and(|port| self.arena.inport_ready(port.id()))
    }

    /// Publish `value` on the named outport.
    pub fn set_output<T: Any + Send + Sync>(
        &mut self,
        name: &str,
        value: T,
    ) -> Result<(), ProcessorError> {
        self.set_output_data(name, Some(Arc::new(value)))
    }

    pub fn clear_output(&mut self, name: &str) -> Result<(), ProcessorError> {
        self.set_output_data(name, None)
    }

    fn set_output_data(&mut self, name: &str, data: Option<PortData>) -> Result<(), ProcessorError> {
        let port_id = self
            .slot()
            .and_then(|slot| slot.outport(name))
            .map(|port| port.id())
            .ok_or_else(|| self.unknown_port(name))?;
        if let Some(port) = self.arena.outport_mut(port_id) {
            port.set_data(data);
        }
        self.arena.invalidate_outport_readiness(port_id);
        Ok(())
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.slot()
            .and_then(|slot| slot.outport(name))
            .is_some_and(|port| port.has_data())
    }

    /// Current value of a property, addressed by a dot separated path.
    pub fn property(&self, path: &str) -> Option<&PropertyValue> {
        let slot = self.slot()?;
        let segments: Vec<&str> = path.split('.').collect();
        let id = slot.property_by_path(&segments)?;
        slot.properties().get(id.index()).map(|p| p.value())
    }

    pub fn float(&self, path: &str) -> Option<f64> {
        self.property(path).and_then(PropertyValue::as_float)
    }

    pub fn int(&self, path: &str) -> Option<i64> {
        self.property(path).and_then(PropertyValue::as_int)
    }

    pub fn bool(&self, path: &str) -> Option<bool> {
        self.property(path).and_then(PropertyValue::as_bool)
    }

    /// Queue a write to one of this processor's properties.
    pub fn set_property(&mut self, path: &str, value: PropertyValue) -> Result<(), ProcessorError> {
        let segments: Vec<&str> = path.split('.').collect();
        let property = self
            .slot()
            .and_then(|slot| slot.property_by_path(&segments))
            .ok_or_else(|| {
                ProcessorError::new(format!(
                    "processor '{}' has no property '{}'",
                    self.identifier(),
                    path
                ))
            })?;
        self.requests
            .push(ProcessorRequest::SetProperty { property, value });
        Ok(())
    }

    /// Queue an invalidation of this processor, picked up by a follow-up pass.
    pub fn invalidate(&mut self, level: InvalidationLevel) {
        self.requests.push(ProcessorRequest::Invalidate {
            processor: self.id,
            level,
        });
    }

    pub(crate) fn into_requests(self) -> Vec<ProcessorRequest> {
        self.requests
    }
}
