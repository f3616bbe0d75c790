//! flownet demo - builds a small network and logs its evaluation.
//!
//! Usage: `flownet [settings.toml]`. Without an argument the platform
//! settings file is used if present.

use anyhow::Context;
use flownet::{
    config::{default_settings_path, init_logging},
    InvalidationLevel, NetworkSettings, PortDescriptor, ProcessContext, Processor, ProcessorError,
    ProcessorNetwork, PropertyDescriptor, PropertyValue,
};
use std::path::PathBuf;

/// Emits its `value` property.
struct NumberSource;

impl Processor for NumberSource {
    fn class_identifier(&self) -> &str {
        "NumberSource"
    }

    fn display_name(&self) -> &str {
        "Source"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::outport::<f64>("out")]
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::float("value", 1.0)]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let value = ctx.float("value").unwrap_or_default();
        ctx.set_output("out", value)
    }
}

/// Multiplies every input by `factor` and emits the sum.
struct Scale;

impl Processor for Scale {
    fn class_identifier(&self) -> &str {
        "Scale"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::multi_inport::<f64>("in"),
            PortDescriptor::outport::<f64>("out"),
        ]
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        vec![PropertyDescriptor::float("factor", 2.0)]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        let factor = ctx.float("factor").unwrap_or(1.0);
        let sum: f64 = ctx.inputs::<f64>("in").iter().map(|v| **v * factor).sum();
        ctx.set_output("out", sum)
    }
}

/// Logs whatever arrives.
struct Printer;

impl Processor for Printer {
    fn class_identifier(&self) -> &str {
        "Printer"
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        vec![PortDescriptor::inport::<f64>("in")]
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        if let Some(value) = ctx.input::<f64>("in") {
            tracing::info!("{} received {}", ctx.identifier(), value);
        }
        Ok(())
    }

    fn do_if_not_ready(&mut self, ctx: &mut ProcessContext<'_>) {
        tracing::info!("{} has no input yet", ctx.identifier());
    }
}

fn load_settings() -> NetworkSettings {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(default_settings_path);
    match path {
        Some(path) => NetworkSettings::load_or_default(path),
        None => NetworkSettings::default(),
    }
}

fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let _log_guard = init_logging(&settings.logging).context("initializing logging")?;

    tracing::info!("Starting flownet demo");

    let mut network = ProcessorNetwork::with_settings(settings);

    // Build the whole graph under one lock so it evaluates once.
    let (first, second, scale) = {
        let mut locked = network.locked();
        let first = locked.add(NumberSource)?;
        let second = locked.add(NumberSource)?;
        let scale = locked.add(Scale)?;
        let printer = locked.add(Printer)?;

        for source in [first, second] {
            let out = locked.require_outport(source, "out")?;
            let inp = locked.require_inport(scale, "in")?;
            locked.add_connection(out, inp)?;
        }
        let out = locked.require_outport(scale, "out")?;
        let inp = locked.require_inport(printer, "in")?;
        locked.add_connection(out, inp)?;

        locked.auto_link_processor(second)?;
        (first, second, scale)
    };
    print_report(&network)?;

    // The sources share a bidirectional link on "value".
    let value = network.require_property(&["Source", "value"])?;
    let mirrored = network.require_property(&["Source 2", "value"])?;
    tracing::info!("Linked: {}", network.is_linked_bidirectional(value, mirrored));
    network.set_property(value, PropertyValue::Float(5.0))?;
    print_report(&network)?;

    let factor = network.require_property(&["Scale", "factor"])?;
    network.set_property(factor, PropertyValue::Float(0.5))?;
    print_report(&network)?;

    let printer = network.require_processor("Printer")?;
    network.invalidate(first, InvalidationLevel::InvalidResources);
    print_report(&network)?;

    tracing::info!(
        "Order: {:?}, upstream of scale: {:?}, second feeds: {:?}, printer ready: {}",
        network.topological_sort(),
        network.transitive_predecessors(scale),
        network.direct_successors(second),
        network.is_processor_ready(printer)
    );

    Ok(())
}

fn print_report(network: &ProcessorNetwork) -> anyhow::Result<()> {
    let json = serde_json::to_string(network.last_report()).context("serializing report")?;
    println!("{}", json);
    Ok(())
}
