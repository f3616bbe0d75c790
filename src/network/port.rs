//! Ports: typed, named attachment points on a processor.
//!
//! Each processor declares its ports via `PortDescriptor`s. The network turns
//! them into `Inport`/`Outport` runtime records that hold the connection
//! adjacency (as handles), the readiness cache and the `changed` bookkeeping.

use crate::network::id::{InportId, OutportId, ProcessorId};
use crate::network::processor::InvalidationLevel;
use crate::network::state::StateCoordinator;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Data held by an outport. Consumers downcast to the declared type.
pub type PortData = Arc<dyn Any + Send + Sync>;

/// Whether a port is an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// The type of data flowing through a port.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    id: TypeId,
    name: &'static str,
}

impl DataType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({})", self.name)
    }
}

/// Descriptor for a processor's port.
#[derive(Debug, Clone)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    pub data_type: DataType,
    /// An optional inport is ready even without a ready producer.
    pub optional: bool,
    /// Maximum number of connected outports; `0` means unbounded.
    pub max_connections: usize,
}

impl PortDescriptor {
    /// Single-connection, required inport.
    pub fn inport<T: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            data_type: DataType::of::<T>(),
            optional: false,
            max_connections: 1,
        }
    }

    /// Inport accepting any number of connections.
    pub fn multi_inport<T: Any>(name: impl Into<String>) -> Self {
        Self {
            max_connections: 0,
            ..Self::inport::<T>(name)
        }
    }

    pub fn outport<T: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            data_type: DataType::of::<T>(),
            optional: false,
            max_connections: 0,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

/// Callbacks registered on a port. Each list fires once per transition.
#[derive(Default)]
pub struct PortCallbacks {
    on_change: Vec<Box<dyn FnMut()>>,
    on_connect: Vec<Box<dyn FnMut()>>,
    on_disconnect: Vec<Box<dyn FnMut()>>,
    on_invalid: Vec<Box<dyn FnMut()>>,
}

impl PortCallbacks {
    fn fire(list: &mut [Box<dyn FnMut()>]) {
        for callback in list.iter_mut() {
            callback();
        }
    }
}

impl fmt::Debug for PortCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortCallbacks")
            .field("on_change", &self.on_change.len())
            .field("on_connect", &self.on_connect.len())
            .field("on_disconnect", &self.on_disconnect.len())
            .field("on_invalid", &self.on_invalid.len())
            .finish()
    }
}

/// Inputs to a custom inport readiness predicate.
#[derive(Debug, Clone)]
pub struct ReadyState {
    pub optional: bool,
    /// Readiness of each connected outport, in connection order.
    pub outports_ready: Vec<bool>,
}

pub type ReadyUpdater = Box<dyn Fn(&ReadyState) -> bool>;

/// Runtime state of a consuming port.
pub struct Inport {
    descriptor: PortDescriptor,
    id: InportId,
    connected: Vec<OutportId>,
    changed: bool,
    changed_outports: Vec<OutportId>,
    invalidation_level: InvalidationLevel,
    pub(crate) ready: StateCoordinator<bool>,
    ready_updater: Option<ReadyUpdater>,
    callbacks: PortCallbacks,
}

impl Inport {
    pub(crate) fn new(id: InportId, descriptor: PortDescriptor) -> Self {
        Self {
            descriptor,
            id,
            connected: Vec::new(),
            changed: false,
            changed_outports: Vec::new(),
            invalidation_level: InvalidationLevel::Valid,
            ready: StateCoordinator::new(false),
            ready_updater: None,
            callbacks: PortCallbacks::default(),
        }
    }

    pub fn id(&self) -> InportId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.descriptor.name
    }

    pub fn owner(&self) -> ProcessorId {
        self.id.processor()
    }

    pub fn data_type(&self) -> DataType {
        self.descriptor.data_type
    }

    pub fn is_optional(&self) -> bool {
        self.descriptor.optional
    }

    pub fn set_optional(&mut self, optional: bool) {
        self.descriptor.optional = optional;
        self.ready.invalidate();
    }

    /// `0` means unbounded.
    pub fn max_connections(&self) -> usize {
        self.descriptor.max_connections
    }

    pub fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    pub fn is_connected_to(&self, outport: OutportId) -> bool {
        self.connected.contains(&outport)
    }

    pub fn connected_outports(&self) -> &[OutportId] {
        &self.connected
    }

    pub fn number_of_connections(&self) -> usize {
        self.connected.len()
    }

    /// Whether one more connection fits under the maximum.
    pub fn has_capacity(&self) -> bool {
        self.max_connections() == 0 || self.connected.len() < self.max_connections()
    }

    /// Type check for a candidate producer.
    pub fn can_connect_to(&self, outport: &Outport) -> bool {
        self.data_type() == outport.data_type()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Producers that delivered new data since the owner last consumed.
    pub fn changed_outports(&self) -> &[OutportId] {
        &self.changed_outports
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.invalidation_level
    }

    /// Install a custom readiness predicate replacing the default rule.
    pub fn set_is_ready_updater(&mut self, updater: impl Fn(&ReadyState) -> bool + 'static) {
        self.ready_updater = Some(Box::new(updater));
        self.ready.invalidate();
    }

    pub fn on_change(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_change.push(Box::new(callback));
    }

    pub fn on_connect(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_connect.push(Box::new(callback));
    }

    pub fn on_disconnect(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_disconnect.push(Box::new(callback));
    }

    pub fn on_invalid(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_invalid.push(Box::new(callback));
    }

    /// Readiness given the readiness of each connected outport.
    pub(crate) fn compute_ready(&self, outports_ready: &[bool]) -> bool {
        match &self.ready_updater {
            Some(updater) => updater(&ReadyState {
                optional: self.is_optional(),
                outports_ready: outports_ready.to_vec(),
            }),
            None => self.is_optional() || outports_ready.iter().any(|&ready| ready),
        }
    }

    pub(crate) fn connect_to(&mut self, outport: OutportId) {
        self.connected.push(outport);
        self.ready.invalidate();
        PortCallbacks::fire(&mut self.callbacks.on_connect);
        self.set_changed(true, Some(outport));
    }

    pub(crate) fn disconnect_from(&mut self, outport: OutportId) -> bool {
        let before = self.connected.len();
        self.connected.retain(|&o| o != outport);
        if self.connected.len() == before {
            return false;
        }
        self.changed_outports.retain(|&o| o != outport);
        self.ready.invalidate();
        PortCallbacks::fire(&mut self.callbacks.on_disconnect);
        self.set_changed(true, None);
        true
    }

    /// Record a change caused by `source`. `on_change` fires only on the
    /// unchanged → changed transition.
    pub(crate) fn set_changed(&mut self, changed: bool, source: Option<OutportId>) {
        let was_changed = self.changed;
        self.changed = changed;
        if changed {
            if let Some(source) = source {
                if !self.changed_outports.contains(&source) {
                    self.changed_outports.push(source);
                }
            }
            if !was_changed {
                PortCallbacks::fire(&mut self.callbacks.on_change);
            }
        } else {
            self.changed_outports.clear();
        }
    }

    /// Raise the port's level. Returns `true` on a Valid → invalid transition.
    pub(crate) fn invalidate(&mut self, level: InvalidationLevel) -> bool {
        self.ready.invalidate();
        if level <= self.invalidation_level {
            return false;
        }
        let was_valid = self.invalidation_level == InvalidationLevel::Valid;
        self.invalidation_level = level;
        if was_valid {
            PortCallbacks::fire(&mut self.callbacks.on_invalid);
        }
        was_valid
    }

    pub(crate) fn set_valid(&mut self) {
        self.invalidation_level = InvalidationLevel::Valid;
        self.ready.invalidate();
    }
}

impl fmt::Debug for Inport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inport")
            .field("id", &self.id)
            .field("name", &self.descriptor.name)
            .field("connected", &self.connected)
            .field("changed", &self.changed)
            .field("level", &self.invalidation_level)
            .finish()
    }
}

/// Runtime state of a producing port.
pub struct Outport {
    descriptor: PortDescriptor,
    id: OutportId,
    connected: Vec<InportId>,
    data: Option<PortData>,
    invalidation_level: InvalidationLevel,
    pub(crate) ready: StateCoordinator<bool>,
    callbacks: PortCallbacks,
}

impl Outport {
    pub(crate) fn new(id: OutportId, descriptor: PortDescriptor) -> Self {
        Self {
            descriptor,
            id,
            connected: Vec::new(),
            data: None,
            invalidation_level: InvalidationLevel::Valid,
            ready: StateCoordinator::new(false),
            callbacks: PortCallbacks::default(),
        }
    }

    pub fn id(&self) -> OutportId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.descriptor.name
    }

    pub fn owner(&self) -> ProcessorId {
        self.id.processor()
    }

    pub fn data_type(&self) -> DataType {
        self.descriptor.data_type
    }

    pub fn descriptor(&self) -> &PortDescriptor {
        &self.descriptor
    }

    pub fn is_connected(&self) -> bool {
        !self.connected.is_empty()
    }

    pub fn connected_inports(&self) -> &[InportId] {
        &self.connected
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&PortData> {
        self.data.as_ref()
    }

    pub fn invalidation_level(&self) -> InvalidationLevel {
        self.invalidation_level
    }

    pub fn on_change(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_change.push(Box::new(callback));
    }

    pub fn on_connect(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_connect.push(Box::new(callback));
    }

    pub fn on_disconnect(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_disconnect.push(Box::new(callback));
    }

    pub fn on_invalid(&mut self, callback: impl FnMut() + 'static) {
        self.callbacks.on_invalid.push(Box::new(callback));
    }

    pub(crate) fn set_data(&mut self, data: Option<PortData>) {
        self.data = data;
        self.ready.invalidate();
        PortCallbacks::fire(&mut self.callbacks.on_change);
    }

    pub(crate) fn connect_to(&mut self, inport: InportId) {
        self.connected.push(inport);
        PortCallbacks::fire(&mut self.callbacks.on_connect);
    }

    pub(crate) fn disconnect_from(&mut self, inport: InportId) -> bool {
        let before = self.connected.len();
        self.connected.retain(|&i| i != inport);
        if self.connected.len() == before {
            return false;
        }
        PortCallbacks::fire(&mut self.callbacks.on_disconnect);
        true
    }

    /// Raise the port's level. Returns `true` on a Valid → invalid transition.
    pub(crate) fn invalidate(&mut self, level: InvalidationLevel) -> bool {
        self.ready.invalidate();
        if level <= self.invalidation_level {
            return false;
        }
        let was_valid = self.invalidation_level == InvalidationLevel::Valid;
        self.invalidation_level = level;
        if was_valid {
            PortCallbacks::fire(&mut self.callbacks.on_invalid);
        }
        was_valid
    }

    /// Returns `true` if the port was invalid before.
    pub(crate) fn set_valid(&mut self) -> bool {
        let was_invalid = self.invalidation_level != InvalidationLevel::Valid;
        self.invalidation_level = InvalidationLevel::Valid;
        self.ready.invalidate();
        was_invalid
    }
}

impl fmt::Debug for Outport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outport")
            .field("id", &self.id)
            .field("name", &self.descriptor.name)
            .field("connected", &self.connected)
            .field("has_data", &self.data.is_some())
            .field("level", &self.invalidation_level)
            .finish()
    }
}
