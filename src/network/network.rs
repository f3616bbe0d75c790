//! The processor network: owner of processors, connections and links.
//!
//! All structural mutations go through `ProcessorNetwork` so it can keep the
//! adjacency in ports, the link caches and the observers consistent. Every
//! mutation runs under the network lock; evaluation requested while locked
//! is deferred and runs once when the outermost lock is released.

use crate::config::NetworkSettings;
use crate::error::{NetworkError, Result, ResultExt};
use crate::network::arena::ProcessorArena;
use crate::network::connection::{Connection, PropertyLink};
use crate::network::context::ProcessorRequest;
use crate::network::converter::{ConverterHandle, ConverterRegistry};
use crate::network::evaluator::{EvaluationReport, EvaluationType, Evaluator, ExceptionContext};
use crate::network::graph;
use crate::network::id::{InportId, ObserverId, OutportId, ProcessorId, PropertyId};
use crate::network::link_evaluator::LinkEvaluator;
use crate::network::observer::NetworkObserver;
use crate::network::port::{Inport, Outport};
use crate::network::processor::{split_numeric_suffix, InvalidationLevel, Processor, ProcessorSlot};
use crate::network::property::{Property, PropertyValue};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

pub struct ProcessorNetwork {
    arena: ProcessorArena,
    /// Chronological order.
    connections: Vec<Connection>,
    links: Vec<PropertyLink>,
    identifiers: HashMap<String, ProcessorId>,
    evaluator: Evaluator,
    link_evaluator: LinkEvaluator,
    converters: ConverterRegistry,
    observers: Vec<(ObserverId, Box<dyn NetworkObserver>)>,
    next_observer_id: u32,
    settings: NetworkSettings,
    lock_count: u32,
    /// Processors whose invalidation is currently propagating.
    invalidating: Vec<ProcessorId>,
    evaluating: bool,
    evaluation_pending: bool,
    modified: bool,
    last_report: EvaluationReport,
}

impl ProcessorNetwork {
    pub fn new() -> Self {
        Self::with_settings(NetworkSettings::default())
    }

    pub fn with_settings(settings: NetworkSettings) -> Self {
        let mut evaluator = Evaluator::new();
        evaluator.set_log_pass_timings(settings.evaluation.log_pass_timings);
        Self {
            arena: ProcessorArena::new(),
            connections: Vec::new(),
            links: Vec::new(),
            identifiers: HashMap::new(),
            evaluator,
            link_evaluator: LinkEvaluator::new(),
            converters: ConverterRegistry::with_defaults(),
            observers: Vec::new(),
            next_observer_id: 0,
            settings,
            lock_count: 0,
            invalidating: Vec::new(),
            evaluating: false,
            evaluation_pending: false,
            modified: false,
            last_report: EvaluationReport::default(),
        }
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    // ==================== Observers ====================

    pub fn add_observer(&mut self, observer: Box<dyn NetworkObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> Option<Box<dyn NetworkObserver>> {
        let index = self.observers.iter().position(|(oid, _)| *oid == id)?;
        Some(self.observers.remove(index).1)
    }

    fn notify(&mut self, mut f: impl FnMut(&mut dyn NetworkObserver)) {
        for (_, observer) in self.observers.iter_mut() {
            f(observer.as_mut());
        }
    }

    // ==================== Locking ====================

    /// Defer evaluation until the matching `unlock`. Nests.
    pub fn lock(&mut self) {
        self.lock_count += 1;
    }

    /// Release one lock level. Releasing the outermost lock notifies
    /// observers and runs any evaluation requested meanwhile.
    pub fn unlock(&mut self) {
        if self.lock_count == 0 {
            tracing::warn!("unlock called on an unlocked network");
            return;
        }
        self.lock_count -= 1;
        if self.lock_count == 0 {
            self.notify(|o| o.on_network_unlocked());
            if self.evaluation_pending {
                self.evaluate();
            }
        }
    }

    /// Scoped lock; the network is unlocked when the guard drops.
    pub fn locked(&mut self) -> NetworkLock<'_> {
        self.lock();
        NetworkLock { network: self }
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn is_invalidating(&self) -> bool {
        !self.invalidating.is_empty()
    }

    pub fn is_linking(&self) -> bool {
        self.link_evaluator.is_linking()
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating
    }

    // ==================== Processors ====================

    /// Add a processor. Its identifier is derived from the display name and
    /// made unique. The new processor is invalidated with `InvalidResources`.
    pub fn add_processor(&mut self, processor: Box<dyn Processor>) -> Result<ProcessorId> {
        let identifier = self.unique_identifier(processor.display_name());
        let Some(id) = self.arena.next_id() else {
            tracing::warn!("Rejected processor '{}': no processor ids left", identifier);
            return Err(NetworkError::TooManyProcessors(ProcessorId::MAX_PROCESSORS));
        };
        let slot = ProcessorSlot::new(id, identifier.clone(), processor).map_err(|e| {
            tracing::warn!("Rejected processor '{}': {}", identifier, e);
            e
        })?;

        self.lock();
        self.notify(|o| o.will_add_processor(id));
        self.arena.insert(slot);
        self.identifiers.insert(identifier.clone(), id);
        self.modified = true;
        tracing::info!("Added processor {:?} '{}'", id, identifier);
        self.invalidate(id, InvalidationLevel::InvalidResources);
        self.notify(|o| o.did_add_processor(id));
        self.unlock();

        Ok(id)
    }

    /// Convenience wrapper around `add_processor`.
    pub fn add<P: Processor + 'static>(&mut self, processor: P) -> Result<ProcessorId> {
        self.add_processor(Box::new(processor))
    }

    /// Remove a processor after removing every connection and link touching it.
    pub fn remove_processor(&mut self, id: ProcessorId) -> Result<Box<dyn Processor>> {
        if !self.arena.contains(id) {
            return Err(NetworkError::UnknownProcessor(id));
        }

        self.lock();
        let connections: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| c.involves(id))
            .copied()
            .collect();
        for connection in connections {
            self.remove_connection(connection.outport, connection.inport);
        }
        for link in self.link_evaluator.links_involving(id) {
            self.remove_link(link.source, link.destination);
        }

        self.notify(|o| o.will_remove_processor(id));
        let slot = self.arena.remove(id);
        if let Some(slot) = &slot {
            self.identifiers.remove(slot.identifier());
            tracing::info!("Removed processor {:?} '{}'", id, slot.identifier());
        }
        self.modified = true;
        self.notify(|o| o.did_remove_processor(id));
        self.unlock();

        slot.and_then(|mut slot| slot.processor.take())
            .ok_or(NetworkError::UnknownProcessor(id))
    }

    /// Remove every processor, and with them every edge, under one lock.
    pub fn clear(&mut self) {
        self.lock();
        for id in self.arena.ids() {
            if let Err(e) = self.remove_processor(id) {
                tracing::warn!("Failed to remove processor {:?} during clear: {}", id, e);
            }
        }
        self.unlock();
    }

    fn unique_identifier(&self, base: &str) -> String {
        let base = if base.trim().is_empty() { "Processor" } else { base.trim() };
        if !self.identifiers.contains_key(base) {
            return base.to_string();
        }
        let (stem, number) = split_numeric_suffix(base);
        let mut n = number.map_or(2, |n| n + 1);
        loop {
            let candidate = format!("{} {}", stem, n);
            if !self.identifiers.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Rename a processor. Returns the identifier actually assigned, which
    /// gets a numeric suffix if `identifier` is taken by another processor.
    pub fn set_processor_identifier(&mut self, id: ProcessorId, identifier: &str) -> Result<String> {
        let current = self
            .arena
            .get(id)
            .ok_or(NetworkError::UnknownProcessor(id))?
            .identifier()
            .to_string();
        if current == identifier {
            return Ok(current);
        }
        self.identifiers.remove(&current);
        let unique = self.unique_identifier(identifier);
        self.identifiers.insert(unique.clone(), id);
        if let Some(slot) = self.arena.get_mut(id) {
            slot.set_identifier(unique.clone());
        }
        self.modified = true;
        Ok(unique)
    }

    pub fn processors(&self) -> Vec<ProcessorId> {
        self.arena.ids()
    }

    pub fn processor(&self, id: ProcessorId) -> Option<&ProcessorSlot> {
        self.arena.get(id)
    }

    pub fn processor_by_identifier(&self, identifier: &str) -> Option<ProcessorId> {
        self.identifiers.get(identifier).copied()
    }

    pub fn require_processor(&self, identifier: &str) -> Result<ProcessorId> {
        self.processor_by_identifier(identifier)
            .ok_or_else(|| NetworkError::UnknownIdentifier(identifier.to_string()))
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn arena(&self) -> &ProcessorArena {
        &self.arena
    }

    // ==================== Ports ====================

    pub fn inport(&self, processor: ProcessorId, name: &str) -> Option<InportId> {
        self.arena.get(processor)?.inport(name).map(Inport::id)
    }

    pub fn outport(&self, processor: ProcessorId, name: &str) -> Option<OutportId> {
        self.arena.get(processor)?.outport(name).map(Outport::id)
    }

    /// Resolve a port name or fail with a descriptive error.
    pub fn require_inport(&self, processor: ProcessorId, name: &str) -> Result<InportId> {
        let slot = self
            .arena
            .get(processor)
            .ok_or(NetworkError::UnknownProcessor(processor))?;
        slot.inport(name)
            .map(Inport::id)
            .ok_or_else(|| NetworkError::UnknownPortName {
                processor: slot.identifier().to_string(),
                name: name.to_string(),
            })
    }

    pub fn require_outport(&self, processor: ProcessorId, name: &str) -> Result<OutportId> {
        let slot = self
            .arena
            .get(processor)
            .ok_or(NetworkError::UnknownProcessor(processor))?;
        slot.outport(name)
            .map(Outport::id)
            .ok_or_else(|| NetworkError::UnknownPortName {
                processor: slot.identifier().to_string(),
                name: name.to_string(),
            })
    }

    pub fn inport_state(&self, id: InportId) -> Option<&Inport> {
        self.arena.inport(id)
    }

    pub fn outport_state(&self, id: OutportId) -> Option<&Outport> {
        self.arena.outport(id)
    }

    /// Mutable access for registering callbacks or installing a readiness
    /// predicate.
    pub fn inport_mut(&mut self, id: InportId) -> Option<&mut Inport> {
        self.arena.inport_mut(id)
    }

    pub fn outport_mut(&mut self, id: OutportId) -> Option<&mut Outport> {
        self.arena.outport_mut(id)
    }

    pub fn is_inport_ready(&self, id: InportId) -> bool {
        self.arena.inport_ready(id)
    }

    pub fn is_outport_ready(&self, id: OutportId) -> bool {
        self.arena.outport_ready(id)
    }

    pub fn is_processor_ready(&self, id: ProcessorId) -> bool {
        self.arena.processor_ready(id)
    }

    pub fn is_inport_in_network(&self, id: InportId) -> bool {
        self.arena.inport(id).is_some()
    }

    pub fn is_outport_in_network(&self, id: OutportId) -> bool {
        self.arena.outport(id).is_some()
    }

    // ==================== Connections ====================

    fn rejected(&self, err: NetworkError) -> NetworkError {
        tracing::warn!("Rejected structural change: {}", err);
        err
    }

    /// Connect an outport to an inport. Connecting an existing pair is a no-op.
    pub fn add_connection(&mut self, outport: OutportId, inport: InportId) -> Result<Connection> {
        let connection = Connection::new(outport, inport);
        if self.connections.contains(&connection) {
            return Ok(connection);
        }

        let out = self
            .arena
            .outport(outport)
            .ok_or_else(|| self.rejected(NetworkError::UnknownOutport(outport)))?;
        let inp = self
            .arena
            .inport(inport)
            .ok_or_else(|| self.rejected(NetworkError::UnknownInport(inport)))?;

        if outport.processor() == inport.processor() {
            return Err(self.rejected(NetworkError::CycleDetected { outport, inport }));
        }

        let consumer_accepts = self
            .arena
            .get(inport.processor())
            .and_then(ProcessorSlot::processor)
            .map_or(true, |p| p.can_connect_to(inp.identifier(), out.descriptor()));
        if !inp.can_connect_to(out) || !consumer_accepts {
            return Err(self.rejected(NetworkError::IncompatiblePorts {
                outport,
                inport,
                outport_type: out.data_type().name(),
                inport_type: inp.data_type().name(),
            }));
        }

        if !inp.has_capacity() {
            return Err(self.rejected(NetworkError::ConnectionLimit {
                inport,
                max: inp.max_connections(),
            }));
        }

        if graph::would_create_cycle(&self.arena, outport.processor(), inport.processor()) {
            return Err(self.rejected(NetworkError::CycleDetected { outport, inport }));
        }

        self.lock();
        self.notify(|o| o.will_add_connection(connection));
        if let Some(port) = self.arena.outport_mut(outport) {
            port.connect_to(inport);
        }
        if let Some(port) = self.arena.inport_mut(inport) {
            port.connect_to(outport);
        }
        self.arena.invalidate_outport_readiness(outport);
        self.connections.push(connection);
        self.modified = true;
        tracing::info!("Added connection {}", connection);
        self.invalidate(inport.processor(), InvalidationLevel::InvalidOutput);
        self.notify(|o| o.did_add_connection(connection));
        self.unlock();

        Ok(connection)
    }

    /// Disconnect a pair. Returns `false` if they were not connected.
    pub fn remove_connection(&mut self, outport: OutportId, inport: InportId) -> bool {
        let connection = Connection::new(outport, inport);
        if !self.connections.contains(&connection) {
            return false;
        }

        self.lock();
        self.notify(|o| o.will_remove_connection(connection));
        if let Some(port) = self.arena.outport_mut(outport) {
            port.disconnect_from(inport);
        }
        if let Some(port) = self.arena.inport_mut(inport) {
            port.disconnect_from(outport);
        }
        self.connections.retain(|c| *c != connection);
        self.modified = true;
        tracing::info!("Removed connection {}", connection);
        self.invalidate(inport.processor(), InvalidationLevel::InvalidOutput);
        self.notify(|o| o.did_remove_connection(connection));
        self.unlock();

        true
    }

    /// Connections in the order they were made.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, outport: OutportId, inport: InportId) -> Option<Connection> {
        let connection = Connection::new(outport, inport);
        self.connections.contains(&connection).then_some(connection)
    }

    pub fn is_connected(&self, outport: OutportId, inport: InportId) -> bool {
        self.connection(outport, inport).is_some()
    }

    // ==================== Links ====================

    /// Whether a link from `source` to `destination` could carry values.
    pub fn can_link(&self, source: PropertyId, destination: PropertyId) -> bool {
        match (self.arena.property(source), self.arena.property(destination)) {
            (Some(src), Some(dst)) => {
                source != destination
                    && self
                        .converters
                        .can_convert(src.class_identifier(), dst.class_identifier())
            }
            _ => false,
        }
    }

    /// Add a one-way link. Linking an existing pair is a no-op.
    pub fn add_link(&mut self, source: PropertyId, destination: PropertyId) -> Result<PropertyLink> {
        let link = PropertyLink::new(source, destination);
        if self.links.contains(&link) {
            return Ok(link);
        }
        let src = self
            .arena
            .property(source)
            .ok_or_else(|| self.rejected(NetworkError::UnknownProperty(source)))?;
        let dst = self
            .arena
            .property(destination)
            .ok_or_else(|| self.rejected(NetworkError::UnknownProperty(destination)))?;
        if source == destination {
            return Err(self.rejected(NetworkError::SelfLink(source)));
        }
        if !self
            .converters
            .can_convert(src.class_identifier(), dst.class_identifier())
        {
            return Err(self.rejected(NetworkError::NoConverter {
                src_class: src.class_identifier().to_string(),
                dst_class: dst.class_identifier().to_string(),
            }));
        }

        self.lock();
        self.notify(|o| o.will_add_link(link));
        self.links.push(link);
        self.link_evaluator.add_link(link);
        self.modified = true;
        tracing::info!("Added link {}", link);
        self.notify(|o| o.did_add_link(link));
        self.unlock();

        Ok(link)
    }

    /// Remove a link. Returns `false` if it did not exist.
    pub fn remove_link(&mut self, source: PropertyId, destination: PropertyId) -> bool {
        let link = PropertyLink::new(source, destination);
        if !self.links.contains(&link) {
            return false;
        }

        self.lock();
        self.notify(|o| o.will_remove_link(link));
        self.links.retain(|l| *l != link);
        self.link_evaluator.remove_link(link);
        self.modified = true;
        tracing::info!("Removed link {}", link);
        self.notify(|o| o.did_remove_link(link));
        self.unlock();

        true
    }

    pub fn links(&self) -> &[PropertyLink] {
        &self.links
    }

    pub fn link(&self, source: PropertyId, destination: PropertyId) -> Option<PropertyLink> {
        let link = PropertyLink::new(source, destination);
        self.links.contains(&link).then_some(link)
    }

    pub fn is_linked(&self, source: PropertyId, destination: PropertyId) -> bool {
        self.link(source, destination).is_some()
    }

    pub fn is_linked_bidirectional(&self, a: PropertyId, b: PropertyId) -> bool {
        self.is_linked(a, b) && self.is_linked(b, a)
    }

    pub fn properties_linked_to(&self, property: PropertyId) -> Vec<PropertyId> {
        self.link_evaluator.properties_linked_to(property).to_vec()
    }

    pub fn links_between_processors(&self, a: ProcessorId, b: ProcessorId) -> Vec<PropertyLink> {
        self.link_evaluator.links_between_processors(a, b)
    }

    /// Link the linkable properties of `id` with the first property elsewhere
    /// sharing class identifier and identifier. The existing value wins: it
    /// is propagated before the reverse link is added.
    pub fn auto_link_processor(&mut self, id: ProcessorId) -> Result<Vec<PropertyLink>> {
        let slot = self.arena.get(id).ok_or(NetworkError::UnknownProcessor(id))?;
        if !self.settings.links.enable_auto_link {
            return Ok(Vec::new());
        }

        let destinations: Vec<&Property> =
            slot.properties().iter().filter(|p| p.is_linkable()).collect();
        if destinations.is_empty() {
            return Ok(Vec::new());
        }

        let mut pairs = Vec::new();
        for dst in destinations {
            let candidate = self
                .arena
                .iter()
                .filter(|other| other.id() != id)
                .flat_map(|other| other.properties().iter())
                .find(|p| {
                    p.is_linkable()
                        && p.class_identifier() == dst.class_identifier()
                        && p.identifier() == dst.identifier()
                });
            if let Some(candidate) = candidate {
                pairs.push((candidate.id(), dst.id()));
            }
        }

        let mut created = Vec::new();
        self.lock();
        for (candidate, dst) in pairs {
            let result = self
                .add_link(candidate, dst)
                .and_then(|forward| {
                    self.evaluate_links_from_property(candidate);
                    let backward = self.add_link(dst, candidate)?;
                    Ok([forward, backward])
                })
                .with_context(|| format!("Failed to auto-link {} with {}", dst, candidate));
            match result {
                Ok(links) => created.extend(links),
                Err(e) => {
                    self.unlock();
                    return Err(e);
                }
            }
        }
        self.unlock();

        Ok(created)
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Mutable access to the converter registry. Triggered-link caches are
    /// dropped since link usability may change.
    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        self.link_evaluator.clear_transient();
        &mut self.converters
    }

    // ==================== Properties ====================

    pub fn property(&self, id: PropertyId) -> Option<&Property> {
        self.arena.property(id)
    }

    pub fn property_value(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.arena.property(id).map(Property::value)
    }

    /// Resolve `[processor identifier, property, child, ...]`.
    pub fn property_by_path<S: AsRef<str>>(&self, path: &[S]) -> Option<PropertyId> {
        let (processor, rest) = path.split_first()?;
        let id = self.processor_by_identifier(processor.as_ref())?;
        self.arena.get(id)?.property_by_path(rest)
    }

    /// Like `property_by_path`, failing with the joined path.
    pub fn require_property<S: AsRef<str>>(&self, path: &[S]) -> Result<PropertyId> {
        self.property_by_path(path).ok_or_else(|| {
            let joined: Vec<&str> = path.iter().map(AsRef::as_ref).collect();
            NetworkError::UnknownPropertyPath(joined.join("."))
        })
    }

    pub fn is_property_in_network(&self, id: PropertyId) -> bool {
        self.arena.property(id).is_some()
    }

    /// Set a property value. On change the owner is invalidated with the
    /// property's level and the value is propagated along links, all under
    /// one lock. Returns whether the value changed.
    pub fn set_property(&mut self, id: PropertyId, value: PropertyValue) -> Result<bool> {
        let current = self
            .arena
            .property(id)
            .ok_or_else(|| self.rejected(NetworkError::UnknownProperty(id)))?
            .value();
        if !current.same_kind(&value) || current.is_composite() {
            return Err(self.rejected(NetworkError::ValueTypeMismatch {
                property: id,
                expected: current.kind_name(),
                found: value.kind_name(),
            }));
        }

        self.lock();
        let changed = self.write_property(id, value);
        if changed {
            self.propagate_links(id);
            self.notify(|o| o.on_network_changed());
        }
        self.unlock();

        Ok(changed)
    }

    /// Store a value and invalidate the owner. No link propagation.
    fn write_property(&mut self, id: PropertyId, value: PropertyValue) -> bool {
        let Some(property) = self.arena.property_mut(id) else {
            return false;
        };
        if !property.set_value(value) {
            return false;
        }
        let level = property.invalidation_level();
        self.invalidate(id.processor(), level);
        true
    }

    /// Propagate from `id` and from each composite containing it.
    fn propagate_links(&mut self, id: PropertyId) {
        self.evaluate_links_from_property(id);
        let mut parent = self.arena.property(id).and_then(Property::parent);
        while let Some(ancestor) = parent {
            self.evaluate_links_from_property(ancestor);
            parent = self.arena.property(ancestor).and_then(Property::parent);
        }
    }

    /// Push the value of `source` along every link it triggers. Returns
    /// immediately if `source` is being updated by an ongoing propagation.
    pub fn evaluate_links_from_property(&mut self, source: PropertyId) {
        if self.link_evaluator.is_visited(source) {
            return;
        }
        let links = self
            .link_evaluator
            .triggered_links(source, &self.arena, &self.converters);
        if links.is_empty() {
            return;
        }

        self.lock();
        self.link_evaluator.mark_visited(&links);
        for link in &links {
            self.transfer(link.source, link.destination, &link.converter);
        }
        self.link_evaluator.unmark_visited(&links);
        self.unlock();
    }

    /// Move the value of `source` into `destination`. Composites copy their
    /// children pairwise by identifier.
    fn transfer(&mut self, source: PropertyId, destination: PropertyId, converter: &ConverterHandle) {
        let (Some(src), Some(dst)) = (self.arena.property(source), self.arena.property(destination))
        else {
            return;
        };

        if src.is_composite() && dst.is_composite() {
            let mut pairs = Vec::new();
            for &src_child in src.children() {
                let Some(sc) = self.arena.property(src_child) else {
                    continue;
                };
                let matching = dst
                    .children()
                    .iter()
                    .filter_map(|&c| self.arena.property(c))
                    .find(|dc| dc.identifier() == sc.identifier());
                if let Some(dc) = matching {
                    if let Some(conv) =
                        self.converters.converter(sc.class_identifier(), dc.class_identifier())
                    {
                        pairs.push((src_child, dc.id(), conv));
                    }
                }
            }
            for (src_child, dst_child, conv) in pairs {
                self.transfer(src_child, dst_child, &conv);
            }
            return;
        }

        let Some(value) = converter.convert(src.value()) else {
            tracing::trace!("Converter {} produced no value for {}", converter.name(), source);
            return;
        };
        if !dst.value().same_kind(&value) {
            tracing::warn!(
                "Converter {} produced a {} value for {} which holds {}",
                converter.name(),
                value.kind_name(),
                destination,
                dst.value().kind_name()
            );
            return;
        }

        if self.write_property(destination, value) {
            tracing::trace!("Link {} -> {} via {}", source, destination, converter.name());
            self.propagate_links(destination);
        }
    }

    // ==================== Evaluation ====================

    /// Raise a processor's invalidation level and propagate `InvalidOutput`
    /// to everything downstream. Evaluation follows unless the network is
    /// locked. Invalidating at or below the stored level neither propagates
    /// nor fires callbacks, but still requests evaluation if the processor
    /// is invalid.
    pub fn invalidate(&mut self, id: ProcessorId, level: InvalidationLevel) {
        let Some(current) = self.arena.level(id) else {
            return;
        };
        if level <= current {
            if current > InvalidationLevel::Valid && !self.is_invalidating() {
                self.request_evaluation();
            }
            return;
        }

        self.invalidating.push(id);
        let mut stack = vec![(id, level)];
        while let Some((pid, lvl)) = stack.pop() {
            let Some(slot) = self.arena.get_mut(pid) else {
                continue;
            };
            if lvl <= slot.invalidation_level {
                continue;
            }
            slot.invalidation_level = lvl;

            let mut downstream = Vec::new();
            for port in &mut slot.outports {
                port.invalidate(InvalidationLevel::InvalidOutput);
                downstream.extend_from_slice(port.connected_inports());
            }
            self.arena.invalidate_processor_readiness(pid);

            for inport in downstream {
                if let Some(port) = self.arena.inport_mut(inport) {
                    port.invalidate(InvalidationLevel::InvalidOutput);
                }
                stack.push((inport.processor(), InvalidationLevel::InvalidOutput));
            }
        }
        self.invalidating.pop();

        if !self.is_invalidating() {
            self.request_evaluation();
        }
    }

    fn request_evaluation(&mut self) {
        if self.is_locked() || self.evaluating {
            self.evaluation_pending = true;
        } else {
            self.evaluate();
        }
    }

    /// Evaluate everything invalid. Runs follow-up passes while processors
    /// keep invalidating from inside their hooks, up to the configured limit.
    /// Returns an empty report if locked or already evaluating; the request
    /// is then remembered.
    pub fn evaluate(&mut self) -> EvaluationReport {
        if self.is_locked() || self.evaluating {
            self.evaluation_pending = true;
            return EvaluationReport::default();
        }

        self.evaluating = true;
        self.evaluation_pending = false;
        let max_follow_ups = self.settings.evaluation.max_follow_up_passes;
        let mut report = EvaluationReport::default();

        loop {
            let outcome = self.evaluator.run_pass(&mut self.arena);
            if outcome.report.is_empty() {
                break;
            }
            report.merge(outcome.report);
            self.apply_requests(outcome.requests);
            self.evaluation_pending = false;

            if !self.arena.any_invalid() {
                break;
            }
            if report.passes > max_follow_ups {
                tracing::warn!(
                    "Stopped after {} follow-up pass(es); {} processor(s) remain invalid",
                    max_follow_ups,
                    self.arena.invalid_processors().len()
                );
                break;
            }
        }

        self.evaluating = false;
        if !report.is_empty() {
            tracing::debug!(
                passes = report.passes,
                processed = report.processed.len(),
                failed = report.failed.len(),
                "Evaluation finished"
            );
            self.last_report = report.clone();
        }
        report
    }

    fn apply_requests(&mut self, requests: Vec<ProcessorRequest>) {
        if requests.is_empty() {
            return;
        }
        self.lock();
        for request in requests {
            match request {
                ProcessorRequest::SetProperty { property, value } => {
                    if let Err(e) = self.set_property(property, value) {
                        tracing::warn!("Dropped property write from processor: {}", e);
                    }
                }
                ProcessorRequest::Invalidate { processor, level } => {
                    self.invalidate(processor, level);
                }
            }
        }
        self.unlock();
    }

    pub fn set_exception_handler(
        &mut self,
        handler: impl FnMut(ProcessorId, EvaluationType, &ExceptionContext) + 'static,
    ) {
        self.evaluator.set_exception_handler(handler);
    }

    pub fn reset_exception_handler(&mut self) {
        self.evaluator.reset_exception_handler();
    }

    /// Passes that visited at least one processor.
    pub fn pass_count(&self) -> u64 {
        self.evaluator.pass_count()
    }

    /// Report of the last evaluation that did any work.
    pub fn last_report(&self) -> &EvaluationReport {
        &self.last_report
    }

    pub fn invalidation_level(&self, id: ProcessorId) -> Option<InvalidationLevel> {
        self.arena.level(id)
    }

    // ==================== Traversal ====================

    pub fn direct_predecessors(&self, id: ProcessorId) -> Vec<ProcessorId> {
        self.arena.direct_predecessors(id)
    }

    pub fn direct_successors(&self, id: ProcessorId) -> Vec<ProcessorId> {
        self.arena.direct_successors(id)
    }

    pub fn transitive_predecessors(&self, id: ProcessorId) -> Vec<ProcessorId> {
        graph::transitive_predecessors(&self.arena, id)
    }

    pub fn transitive_successors(&self, id: ProcessorId) -> Vec<ProcessorId> {
        graph::transitive_successors(&self.arena, id)
    }

    pub fn topological_sort(&self) -> Vec<ProcessorId> {
        graph::topological_sort(&self.arena)
    }

    // ==================== Modified flag ====================

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }
}

impl Default for ProcessorNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessorNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorNetwork")
            .field("processors", &self.arena.len())
            .field("connections", &self.connections.len())
            .field("links", &self.links.len())
            .field("lock_count", &self.lock_count)
            .field("modified", &self.modified)
            .finish()
    }
}

/// Scoped network lock. Dereferences to the network.
pub struct NetworkLock<'a> {
    network: &'a mut ProcessorNetwork,
}

impl Deref for NetworkLock<'_> {
    type Target = ProcessorNetwork;

    fn deref(&self) -> &ProcessorNetwork {
        self.network
    }
}

impl DerefMut for NetworkLock<'_> {
    fn deref_mut(&mut self) -> &mut ProcessorNetwork {
        self.network
    }
}

impl Drop for NetworkLock<'_> {
    fn drop(&mut self) {
        self.network.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessorError;
    use crate::network::context::ProcessContext;
    use crate::network::observer::MockNetworkObserver;
    use crate::network::port::PortDescriptor;
    use crate::network::property::PropertyDescriptor;
    use mockall::predicate::eq;
    use mockall::Sequence;

    struct Node {
        name: &'static str,
        ports: Vec<PortDescriptor>,
    }

    impl Node {
        fn source(name: &'static str) -> Self {
            Self {
                name,
                ports: vec![PortDescriptor::outport::<i32>("out")],
            }
        }

        fn sink(name: &'static str) -> Self {
            Self {
                name,
                ports: vec![PortDescriptor::inport::<i32>("in")],
            }
        }
    }

    impl Processor for Node {
        fn class_identifier(&self) -> &str {
            self.name
        }

        fn ports(&self) -> Vec<PortDescriptor> {
            self.ports.clone()
        }

        fn properties(&self) -> Vec<PropertyDescriptor> {
            vec![PropertyDescriptor::int("value", 0)]
        }

        fn process(&mut self, ctx: &mut ProcessContext<'_>) -> std::result::Result<(), ProcessorError> {
            if self.ports.iter().any(|p| p.name == "out") {
                ctx.set_output("out", 1i32)?;
            }
            Ok(())
        }
    }

    fn quiet_observer() -> MockNetworkObserver {
        let mut observer = MockNetworkObserver::new();
        observer.expect_on_network_unlocked().return_const(());
        observer.expect_on_network_changed().return_const(());
        observer
    }

    #[test]
    fn test_add_processor_notifies_will_then_did() {
        let mut network = ProcessorNetwork::new();
        let mut observer = quiet_observer();
        let mut seq = Sequence::new();
        observer
            .expect_will_add_processor()
            .with(eq(ProcessorId(0)))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_did_add_processor()
            .with(eq(ProcessorId(0)))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let observer_id = network.add_observer(Box::new(observer));

        network.add(Node::source("Source")).unwrap();

        // Dropping the mock verifies the expectations.
        drop(network.remove_observer(observer_id));
    }

    #[test]
    fn test_remove_processor_removes_edges_first() {
        let mut network = ProcessorNetwork::new();
        let a = network.add(Node::source("A")).unwrap();
        let b = network.add(Node::sink("B")).unwrap();
        let out = network.require_outport(a, "out").unwrap();
        let inp = network.require_inport(b, "in").unwrap();
        let connection = network.add_connection(out, inp).unwrap();
        let pa = network.property_by_path(&["A", "value"]).unwrap();
        let pb = network.property_by_path(&["B", "value"]).unwrap();
        let link = network.add_link(pa, pb).unwrap();

        let mut observer = quiet_observer();
        let mut seq = Sequence::new();
        observer
            .expect_will_remove_connection()
            .with(eq(connection))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_did_remove_connection()
            .with(eq(connection))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_will_remove_link()
            .with(eq(link))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_did_remove_link()
            .with(eq(link))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_will_remove_processor()
            .with(eq(a))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        observer
            .expect_did_remove_processor()
            .with(eq(a))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        let observer_id = network.add_observer(Box::new(observer));

        network.remove_processor(a).unwrap();

        assert!(network.connections().is_empty());
        assert!(network.links().is_empty());
        assert!(network.properties_linked_to(pa).is_empty());
        assert!(!network.is_outport_in_network(out));
        assert!(!network.is_property_in_network(pa));
        assert!(!network.inport_state(inp).unwrap().is_connected());
        drop(network.remove_observer(observer_id));
    }

    #[test]
    fn test_rejected_connection_notifies_nobody() {
        let mut network = ProcessorNetwork::new();
        let a = network.add(Node::source("A")).unwrap();
        let b = network.add(Node::sink("B")).unwrap();
        let c = network.add(Node::source("C")).unwrap();
        let inp = network.require_inport(b, "in").unwrap();
        network
            .add_connection(network.require_outport(a, "out").unwrap(), inp)
            .unwrap();

        // No structural expectations: any notification would panic.
        let observer_id = network.add_observer(Box::new(quiet_observer()));
        let err = network
            .add_connection(network.require_outport(c, "out").unwrap(), inp)
            .unwrap_err();
        assert!(matches!(err, NetworkError::ConnectionLimit { max: 1, .. }));
        assert_eq!(network.connections().len(), 1);
        drop(network.remove_observer(observer_id));
    }

    #[test]
    fn test_unique_identifiers_get_numeric_suffix() {
        let mut network = ProcessorNetwork::new();
        let first = network.add(Node::source("Source")).unwrap();
        let second = network.add(Node::source("Source")).unwrap();
        let third = network.add(Node::source("Source 2")).unwrap();

        assert_eq!(network.processor(first).unwrap().identifier(), "Source");
        assert_eq!(network.processor(second).unwrap().identifier(), "Source 2");
        assert_eq!(network.processor(third).unwrap().identifier(), "Source 3");
        assert_eq!(network.processor_by_identifier("Source 3"), Some(third));

        let renamed = network.set_processor_identifier(first, "Source 2").unwrap();
        assert_eq!(renamed, "Source 4");
        assert_eq!(network.processor_by_identifier("Source 4"), Some(first));
        assert_eq!(network.processor_by_identifier("Source"), None);
    }

    #[test]
    fn test_lock_guard_defers_until_outermost_release() {
        let mut network = ProcessorNetwork::new();
        let a = network.add(Node::source("A")).unwrap();
        let passes = network.pass_count();
        {
            let mut outer = network.locked();
            outer.invalidate(a, InvalidationLevel::InvalidOutput);
            {
                let mut inner = outer.locked();
                inner.invalidate(a, InvalidationLevel::InvalidResources);
                assert_eq!(inner.lock_count(), 2);
            }
            assert!(outer.is_locked());
            assert_eq!(outer.pass_count(), passes);
            assert_eq!(outer.invalidation_level(a), Some(InvalidationLevel::InvalidResources));
        }
        assert!(!network.is_locked());
        assert_eq!(network.pass_count(), passes + 1);
        assert_eq!(network.last_report().initialized, vec![a]);
        assert_eq!(network.invalidation_level(a), Some(InvalidationLevel::Valid));
    }

    #[test]
    fn test_require_lookups_name_what_is_missing() {
        let mut network = ProcessorNetwork::new();
        let a = network.add(Node::source("A")).unwrap();

        assert_eq!(network.require_processor("A").unwrap(), a);
        assert!(matches!(
            network.require_processor("B"),
            Err(NetworkError::UnknownIdentifier(ref name)) if name == "B"
        ));
        assert!(network.require_property(&["A", "value"]).is_ok());
        let err = network.require_property(&["A", "camera", "fov"]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown property path: A.camera.fov");
    }

    #[test]
    fn test_removed_processor_handles_stay_dangling() {
        let mut network = ProcessorNetwork::new();
        let a = network.add(Node::source("A")).unwrap();
        let value = network.require_property(&["A", "value"]).unwrap();
        let out = network.require_outport(a, "out").unwrap();
        network.remove_processor(a).unwrap();

        let b = network.add(Node::source("B")).unwrap();

        assert_ne!(a, b);
        assert!(network.processor(a).is_none());
        assert!(!network.is_property_in_network(value));
        assert!(!network.is_outport_in_network(out));
        assert!(matches!(
            network.set_property(value, PropertyValue::Int(77)),
            Err(NetworkError::UnknownProperty(id)) if id == value
        ));
        let fresh = network.require_property(&["B", "value"]).unwrap();
        assert_eq!(network.property_value(fresh), Some(&PropertyValue::Int(0)));
    }

    #[test]
    fn test_unlock_without_lock_is_ignored() {
        let mut network = ProcessorNetwork::new();
        network.unlock();
        assert_eq!(network.lock_count(), 0);
    }

    #[test]
    fn test_modified_flag_tracks_structure() {
        let mut network = ProcessorNetwork::new();
        assert!(!network.is_modified());
        let a = network.add(Node::source("A")).unwrap();
        assert!(network.is_modified());
        network.set_modified(false);
        network.remove_processor(a).unwrap();
        assert!(network.is_modified());
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut network = ProcessorNetwork::new();
        let a = network.add(Node::source("A")).unwrap();
        let b = network.add(Node::sink("B")).unwrap();
        network
            .add_connection(
                network.require_outport(a, "out").unwrap(),
                network.require_inport(b, "in").unwrap(),
            )
            .unwrap();

        network.clear();
        assert!(network.is_empty());
        assert!(network.connections().is_empty());
        assert_eq!(network.processor_by_identifier("A"), None);
    }
}
