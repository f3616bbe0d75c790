//! Arena owning every processor slot of a network.
//!
//! All cross-processor state queries (port readiness, adjacency) go through
//! the arena so that a port only ever stores handles, never references.

use crate::network::id::{InportId, OutportId, ProcessorId, PropertyId};
use crate::network::port::{Inport, Outport};
use crate::network::processor::{InvalidationLevel, ProcessorSlot};
use crate::network::property::Property;

#[derive(Debug, Default)]
pub struct ProcessorArena {
    slots: Vec<Option<ProcessorSlot>>,
}

impl ProcessorArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for the next processor. Slots of removed processors stay empty
    /// and are never handed out again, so old handles keep missing.
    /// `None` once the id space is exhausted.
    pub(crate) fn next_id(&self) -> Option<ProcessorId> {
        ProcessorId::from_index(self.slots.len())
    }

    pub(crate) fn insert(&mut self, slot: ProcessorSlot) {
        let index = slot.id().index();
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(slot);
    }

    pub(crate) fn remove(&mut self, id: ProcessorId) -> Option<ProcessorSlot> {
        self.slots.get_mut(id.index()).and_then(Option::take)
    }

    pub fn contains(&self, id: ProcessorId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: ProcessorId) -> Option<&ProcessorSlot> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ProcessorId) -> Option<&mut ProcessorSlot> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Live slots in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessorSlot> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn ids(&self) -> Vec<ProcessorId> {
        self.iter().map(ProcessorSlot::id).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upper bound on processor indices, for dense per-processor tables.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn inport(&self, id: InportId) -> Option<&Inport> {
        self.get(id.processor())?.inports.get(id.index())
    }

    pub fn inport_mut(&mut self, id: InportId) -> Option<&mut Inport> {
        self.get_mut(id.processor())?.inports.get_mut(id.index())
    }

    pub fn outport(&self, id: OutportId) -> Option<&Outport> {
        self.get(id.processor())?.outports.get(id.index())
    }

    pub fn outport_mut(&mut self, id: OutportId) -> Option<&mut Outport> {
        self.get_mut(id.processor())?.outports.get_mut(id.index())
    }

    pub fn property(&self, id: PropertyId) -> Option<&Property> {
        self.get(id.processor())?.properties.get(id.index())
    }

    pub fn property_mut(&mut self, id: PropertyId) -> Option<&mut Property> {
        self.get_mut(id.processor())?.properties.get_mut(id.index())
    }

    /// Outport readiness: valid, and the owner agrees (default: has data).
    pub fn outport_ready(&self, id: OutportId) -> bool {
        let Some(slot) = self.get(id.processor()) else {
            return false;
        };
        let Some(port) = slot.outports.get(id.index()) else {
            return false;
        };
        port.ready.get(|| {
            port.invalidation_level().is_valid()
                && match slot.processor() {
                    Some(processor) => {
                        processor.is_outport_ready(port.identifier(), port.has_data())
                    }
                    None => port.has_data(),
                }
        })
    }

    /// Inport readiness, memoized until a connected outport changes.
    pub fn inport_ready(&self, id: InportId) -> bool {
        let Some(port) = self.inport(id) else {
            return false;
        };
        port.ready.get(|| {
            let outports_ready: Vec<bool> = port
                .connected_outports()
                .iter()
                .map(|&out| self.outport_ready(out))
                .collect();
            port.compute_ready(&outports_ready)
        })
    }

    /// Every inport of the processor is ready.
    pub fn inports_ready(&self, id: ProcessorId) -> bool {
        self.get(id).is_some_and(|slot| {
            slot.inports
                .iter()
                .all(|port| self.inport_ready(port.id()))
        })
    }

    /// Processor readiness as decided by the processor itself.
    pub fn processor_ready(&self, id: ProcessorId) -> bool {
        let inports_ready = self.inports_ready(id);
        match self.get(id).and_then(ProcessorSlot::processor) {
            Some(processor) => processor.is_ready(inports_ready),
            None => inports_ready,
        }
    }

    /// Drop cached readiness of an outport and everything reading from it.
    pub(crate) fn invalidate_outport_readiness(&self, id: OutportId) {
        if let Some(port) = self.outport(id) {
            port.ready.invalidate();
            for &inport in port.connected_inports() {
                if let Some(inport) = self.inport(inport) {
                    inport.ready.invalidate();
                }
            }
        }
    }

    /// Drop cached readiness of every outport of a processor.
    pub(crate) fn invalidate_processor_readiness(&self, id: ProcessorId) {
        if let Some(slot) = self.get(id) {
            for port in &slot.outports {
                self.invalidate_outport_readiness(port.id());
            }
        }
    }

    /// Any processor waiting for evaluation.
    pub fn any_invalid(&self) -> bool {
        self.iter().any(|slot| !slot.is_valid())
    }

    pub fn invalid_processors(&self) -> Vec<ProcessorId> {
        self.iter()
            .filter(|slot| !slot.is_valid())
            .map(ProcessorSlot::id)
            .collect()
    }

    pub fn level(&self, id: ProcessorId) -> Option<InvalidationLevel> {
        self.get(id).map(ProcessorSlot::invalidation_level)
    }

    /// Processors consuming data from `id`, deduplicated, in port order.
    pub fn direct_successors(&self, id: ProcessorId) -> Vec<ProcessorId> {
        let mut out = Vec::new();
        if let Some(slot) = self.get(id) {
            for port in &slot.outports {
                for inport in port.connected_inports() {
                    let owner = inport.processor();
                    if !out.contains(&owner) {
                        out.push(owner);
                    }
                }
            }
        }
        out
    }

    /// Processors feeding data into `id`, deduplicated, in port order.
    pub fn direct_predecessors(&self, id: ProcessorId) -> Vec<ProcessorId> {
        let mut out = Vec::new();
        if let Some(slot) = self.get(id) {
            for port in &slot.inports {
                for outport in port.connected_outports() {
                    let owner = outport.processor();
                    if !out.contains(&owner) {
                        out.push(owner);
                    }
                }
            }
        }
        out
    }
}
