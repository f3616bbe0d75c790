//! Property link graph and its propagation caches.
//!
//! Links form a directed graph over properties that may contain cycles. The
//! evaluator keeps three caches:
//!
//! - `direct_link_cache`: authored out-edges per property, kept in sync by
//!   `add_link`/`remove_link`.
//! - `processor_links_cache`: links grouped by the (unordered) pair of
//!   processors they join.
//! - `transient_link_cache`: for a source property, the flat list of
//!   convertible links a change to it triggers. Computed lazily and dropped
//!   wholesale whenever a link is added or removed.
//!
//! Construction of the triggered list never uses a property as an endpoint
//! twice, which bounds it by the number of properties and makes every
//! destination receive at most one update per change. Propagation itself is
//! guarded by the visited set: a property being updated by an ongoing batch
//! cannot start a batch of its own.

use crate::network::arena::ProcessorArena;
use crate::network::connection::{ConvertibleLink, PropertyLink};
use crate::network::converter::ConverterRegistry;
use crate::network::id::{ProcessorId, PropertyId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct LinkEvaluator {
    direct_link_cache: HashMap<PropertyId, Vec<PropertyId>>,
    processor_links_cache: HashMap<(ProcessorId, ProcessorId), Vec<PropertyLink>>,
    transient_link_cache: HashMap<PropertyId, Vec<ConvertibleLink>>,
    /// Endpoints touched by the batches currently propagating, with a count
    /// per nesting level.
    visited: HashMap<PropertyId, u32>,
}

fn processor_pair(link: &PropertyLink) -> (ProcessorId, ProcessorId) {
    let a = link.source.processor();
    let b = link.destination.processor();
    (a.min(b), a.max(b))
}

impl LinkEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_link(&mut self, link: PropertyLink) {
        let targets = self.direct_link_cache.entry(link.source).or_default();
        if !targets.contains(&link.destination) {
            targets.push(link.destination);
        }
        let pair = self.processor_links_cache.entry(processor_pair(&link)).or_default();
        if !pair.contains(&link) {
            pair.push(link);
        }
        self.transient_link_cache.clear();
    }

    pub fn remove_link(&mut self, link: PropertyLink) {
        if let Some(targets) = self.direct_link_cache.get_mut(&link.source) {
            targets.retain(|&dst| dst != link.destination);
            if targets.is_empty() {
                self.direct_link_cache.remove(&link.source);
            }
        }
        let key = processor_pair(&link);
        if let Some(pair) = self.processor_links_cache.get_mut(&key) {
            pair.retain(|l| *l != link);
            if pair.is_empty() {
                self.processor_links_cache.remove(&key);
            }
        }
        self.transient_link_cache.clear();
    }

    /// Authored out-edges of `property`.
    pub fn properties_linked_to(&self, property: PropertyId) -> &[PropertyId] {
        self.direct_link_cache
            .get(&property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Links joining two processors, in either direction.
    pub fn links_between_processors(&self, a: ProcessorId, b: ProcessorId) -> Vec<PropertyLink> {
        self.processor_links_cache
            .get(&(a.min(b), a.max(b)))
            .cloned()
            .unwrap_or_default()
    }

    /// Links a change to `source` triggers, in propagation order.
    pub fn triggered_links(
        &mut self,
        source: PropertyId,
        arena: &ProcessorArena,
        converters: &ConverterRegistry,
    ) -> Vec<ConvertibleLink> {
        if let Some(links) = self.transient_link_cache.get(&source) {
            return links.clone();
        }
        let mut links = Vec::new();
        self.add_to_property_links(&mut links, source, source, arena, converters);
        tracing::trace!(
            "Computed {} triggered link(s) for {}",
            links.len(),
            source
        );
        self.transient_link_cache.insert(source, links.clone());
        links
    }

    fn add_to_property_links(
        &self,
        links: &mut Vec<ConvertibleLink>,
        source: PropertyId,
        current: PropertyId,
        arena: &ProcessorArena,
        converters: &ConverterRegistry,
    ) {
        let Some(current_prop) = arena.property(current) else {
            return;
        };
        for &dst in self.properties_linked_to(current) {
            if dst == source
                || links
                    .iter()
                    .any(|link| link.source == dst || link.destination == dst)
            {
                continue;
            }
            let Some(dst_prop) = arena.property(dst) else {
                continue;
            };
            let Some(converter) =
                converters.converter(current_prop.class_identifier(), dst_prop.class_identifier())
            else {
                continue;
            };

            links.push(ConvertibleLink {
                source: current,
                destination: dst,
                converter,
            });
            self.add_to_property_links(links, source, dst, arena, converters);

            // Linking into a composite cascades to its members' own links.
            if dst_prop.is_composite() {
                let descendants = arena
                    .get(dst.processor())
                    .map(|slot| slot.property_subtree(dst))
                    .unwrap_or_default();
                for child in descendants.into_iter().skip(1) {
                    self.add_to_property_links(links, source, child, arena, converters);
                }
            }
        }
    }

    pub fn is_visited(&self, property: PropertyId) -> bool {
        self.visited.contains_key(&property)
    }

    /// Mark every endpoint of `links` as being updated.
    pub(crate) fn mark_visited(&mut self, links: &[ConvertibleLink]) {
        for link in links {
            *self.visited.entry(link.source).or_insert(0) += 1;
            *self.visited.entry(link.destination).or_insert(0) += 1;
        }
    }

    pub(crate) fn unmark_visited(&mut self, links: &[ConvertibleLink]) {
        for link in links {
            for property in [link.source, link.destination] {
                if let Some(count) = self.visited.get_mut(&property) {
                    *count -= 1;
                    if *count == 0 {
                        self.visited.remove(&property);
                    }
                }
            }
        }
    }

    /// A propagation batch is running.
    pub fn is_linking(&self) -> bool {
        !self.visited.is_empty()
    }

    /// Authored links with an endpoint on `processor`, sorted.
    pub(crate) fn links_involving(&self, processor: ProcessorId) -> Vec<PropertyLink> {
        let mut links: Vec<PropertyLink> = self
            .processor_links_cache
            .iter()
            .filter(|((a, b), _)| *a == processor || *b == processor)
            .flat_map(|(_, links)| links.iter().copied())
            .collect();
        links.sort();
        links
    }

    /// Forget every computed triggered-link list.
    pub(crate) fn clear_transient(&mut self) {
        self.transient_link_cache.clear();
    }

    pub fn cached_sources(&self) -> usize {
        self.transient_link_cache.len()
    }
}
