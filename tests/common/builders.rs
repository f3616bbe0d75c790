//! Test data builders for creating test processors

use super::processors::{CallLog, FailSwitch, Instrumented, ProcessFn};
use flownet::{PortDescriptor, ProcessContext, ProcessorError, PropertyDescriptor};

/// Builder for creating instrumented test processors
pub struct ProcessorBuilder {
    name: String,
    ports: Vec<PortDescriptor>,
    properties: Vec<PropertyDescriptor>,
    fail: FailSwitch,
    on_process: Option<ProcessFn>,
}

impl ProcessorBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ports: Vec::new(),
            properties: Vec::new(),
            fail: FailSwitch::new(),
            on_process: None,
        }
    }

    /// One `u32` outport named `out`.
    pub fn source(name: &str) -> Self {
        Self::new(name).outport("out")
    }

    /// One required `u32` inport named `in`.
    pub fn sink(name: &str) -> Self {
        Self::new(name).inport("in")
    }

    pub fn filter(name: &str) -> Self {
        Self::new(name).inport("in").outport("out")
    }

    pub fn inport(self, name: &str) -> Self {
        self.port(PortDescriptor::inport::<u32>(name))
    }

    pub fn optional_inport(self, name: &str) -> Self {
        self.port(PortDescriptor::inport::<u32>(name).optional())
    }

    pub fn multi_inport(self, name: &str) -> Self {
        self.port(PortDescriptor::multi_inport::<u32>(name))
    }

    pub fn outport(self, name: &str) -> Self {
        self.port(PortDescriptor::outport::<u32>(name))
    }

    pub fn port(mut self, descriptor: PortDescriptor) -> Self {
        self.ports.push(descriptor);
        self
    }

    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.properties.push(descriptor);
        self
    }

    pub fn int(self, identifier: &str, value: i64) -> Self {
        self.property(PropertyDescriptor::int(identifier, value))
    }

    pub fn failing(mut self, fail: &FailSwitch) -> Self {
        self.fail = fail.clone();
        self
    }

    /// Extra work after the outputs are written. Receives the run count.
    pub fn on_process(
        mut self,
        f: impl FnMut(&mut ProcessContext<'_>, u32) -> Result<(), ProcessorError> + 'static,
    ) -> Self {
        self.on_process = Some(Box::new(f));
        self
    }

    pub fn build(self, log: &CallLog) -> Instrumented {
        Instrumented {
            name: self.name,
            ports: self.ports,
            properties: self.properties,
            log: log.clone(),
            fail: self.fail,
            on_process: self.on_process,
            runs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flownet::Processor;

    #[test]
    fn test_processor_builder() {
        let log = CallLog::new();
        let processor = ProcessorBuilder::filter("Blur").int("radius", 3).build(&log);

        assert_eq!(processor.display_name(), "Blur");
        assert_eq!(processor.ports().len(), 2);
        assert_eq!(processor.properties()[0].identifier, "radius");
    }
}
