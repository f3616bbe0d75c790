//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod processors;

use flownet::{Connection, ProcessorId, ProcessorNetwork, PropertyId, PropertyValue};

pub use builders::ProcessorBuilder;
pub use processors::{CallLog, FailSwitch, Hook, Instrumented};

/// Connect `from.out_name` to `to.in_name`, panicking on rejection.
pub fn connect(
    network: &mut ProcessorNetwork,
    from: ProcessorId,
    out_name: &str,
    to: ProcessorId,
    in_name: &str,
) -> Connection {
    let outport = network.require_outport(from, out_name).unwrap();
    let inport = network.require_inport(to, in_name).unwrap();
    network.add_connection(outport, inport).unwrap()
}

/// Add `names` as filters connected `out -> in` in sequence. The first is a
/// source and the last a sink.
pub fn chain(network: &mut ProcessorNetwork, log: &CallLog, names: &[&str]) -> Vec<ProcessorId> {
    let mut ids = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let builder = if i == 0 {
            ProcessorBuilder::source(name)
        } else if i + 1 == names.len() {
            ProcessorBuilder::sink(name)
        } else {
            ProcessorBuilder::filter(name)
        };
        let id = network.add(builder.build(log)).unwrap();
        if let Some(&previous) = ids.last() {
            connect(network, previous, "out", id, "in");
        }
        ids.push(id);
    }
    ids
}

/// Resolve `processor.property` by identifier, panicking if missing.
pub fn property(network: &ProcessorNetwork, processor: &str, name: &str) -> PropertyId {
    network
        .property_by_path(&[processor, name])
        .unwrap_or_else(|| panic!("no property {}.{}", processor, name))
}

pub fn int_value(network: &ProcessorNetwork, id: PropertyId) -> i64 {
    network
        .property_value(id)
        .and_then(PropertyValue::as_int)
        .expect("int property")
}

pub fn revision(network: &ProcessorNetwork, id: PropertyId) -> u64 {
    network.property(id).expect("property in network").revision()
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
