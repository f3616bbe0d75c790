//! Instrumented processors that record every hook invocation.

use flownet::network::{DataType, PortDirection};
use flownet::{
    OutportId, PortDescriptor, ProcessContext, Processor, ProcessorError, PropertyDescriptor,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Which processor hook ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Init,
    Process,
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub processor: String,
    pub hook: Hook,
    /// Changed producers seen on the first inport when the hook ran.
    pub changed: Vec<OutportId>,
}

/// Shared, ordered record of hook invocations across processors.
#[derive(Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }

    pub fn count(&self, processor: &str, hook: Hook) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|c| c.processor == processor && c.hook == hook)
            .count()
    }

    pub fn total(&self) -> usize {
        self.0.borrow().len()
    }

    /// Processors in the order they ran `hook`.
    pub fn order(&self, hook: Hook) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter(|c| c.hook == hook)
            .map(|c| c.processor.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    pub fn last(&self, processor: &str, hook: Hook) -> Option<Call> {
        self.0
            .borrow()
            .iter()
            .rev()
            .find(|c| c.processor == processor && c.hook == hook)
            .cloned()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Makes a processor fail in one hook until reset.
#[derive(Clone, Default)]
pub struct FailSwitch(Rc<Cell<Option<Hook>>>);

impl FailSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, hook: Hook) {
        self.0.set(Some(hook));
    }

    pub fn reset(&self) {
        self.0.set(None);
    }

    fn fails(&self, hook: Hook) -> bool {
        self.0.get() == Some(hook)
    }
}

pub type ProcessFn = Box<dyn FnMut(&mut ProcessContext<'_>, u32) -> Result<(), ProcessorError>>;

/// A processor that logs its hooks and writes its run count to every `u32`
/// outport.
pub struct Instrumented {
    pub(crate) name: String,
    pub(crate) ports: Vec<PortDescriptor>,
    pub(crate) properties: Vec<PropertyDescriptor>,
    pub(crate) log: CallLog,
    pub(crate) fail: FailSwitch,
    pub(crate) on_process: Option<ProcessFn>,
    pub(crate) runs: u32,
}

impl Instrumented {
    fn first_inport(&self) -> Option<&str> {
        self.ports
            .iter()
            .find(|p| p.direction == PortDirection::Input)
            .map(|p| p.name.as_str())
    }

    fn record(&self, ctx: &ProcessContext<'_>, hook: Hook) {
        let changed = self
            .first_inport()
            .map(|name| ctx.changed_outports(name))
            .unwrap_or_default();
        self.log.record(Call {
            processor: ctx.identifier().to_string(),
            hook,
            changed,
        });
    }
}

impl Processor for Instrumented {
    fn class_identifier(&self) -> &str {
        "Instrumented"
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn ports(&self) -> Vec<PortDescriptor> {
        self.ports.clone()
    }

    fn properties(&self) -> Vec<PropertyDescriptor> {
        self.properties.clone()
    }

    fn initialize_resources(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        self.record(ctx, Hook::Init);
        if self.fail.fails(Hook::Init) {
            return Err(ProcessorError::new(format!("{} failed to initialize", self.name)));
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut ProcessContext<'_>) -> Result<(), ProcessorError> {
        self.record(ctx, Hook::Process);
        if self.fail.fails(Hook::Process) {
            return Err(ProcessorError::new(format!("{} failed to process", self.name)));
        }
        self.runs += 1;

        let u32_type = DataType::of::<u32>();
        for port in &self.ports {
            if port.direction == PortDirection::Output && port.data_type == u32_type {
                ctx.set_output(&port.name, self.runs)?;
            }
        }
        if let Some(hook) = self.on_process.as_mut() {
            hook(ctx, self.runs)?;
        }
        Ok(())
    }

    fn do_if_not_ready(&mut self, ctx: &mut ProcessContext<'_>) {
        self.record(ctx, Hook::NotReady);
    }
}
