//! Evaluation passes over invalid processors.
//!
//! A pass schedules every processor downstream of an invalid one, then visits
//! them producers-first. Each processor is initialized if its resources are
//! invalid, processed if ready (otherwise notified via `do_if_not_ready`), and
//! reset to `Valid`. Hook failures are handed to the exception handler and
//! never stop the pass.

use crate::error::ProcessorError;
use crate::network::arena::ProcessorArena;
use crate::network::context::{ProcessContext, ProcessorRequest};
use crate::network::graph;
use crate::network::id::ProcessorId;
use crate::network::processor::InvalidationLevel;
use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// Which hook was running when a processor failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EvaluationType {
    InitResource,
    Process,
    NotReady,
}

impl fmt::Display for EvaluationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvaluationType::InitResource => "initialize_resources",
            EvaluationType::Process => "process",
            EvaluationType::NotReady => "do_if_not_ready",
        };
        f.write_str(s)
    }
}

/// Details of a processor failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionContext {
    pub processor_identifier: String,
    pub message: String,
}

pub type ExceptionHandler = Box<dyn FnMut(ProcessorId, EvaluationType, &ExceptionContext)>;

/// Handler installed by default: logs the failure.
pub fn log_exception(id: ProcessorId, kind: EvaluationType, context: &ExceptionContext) {
    tracing::warn!(
        "Processor '{}' ({}) failed in {}: {}",
        context.processor_identifier,
        id,
        kind,
        context.message
    );
}

/// What happened during one or more passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub passes: u32,
    pub initialized: Vec<ProcessorId>,
    pub processed: Vec<ProcessorId>,
    pub not_ready: Vec<ProcessorId>,
    pub failed: Vec<ProcessorId>,
}

impl EvaluationReport {
    pub fn merge(&mut self, other: EvaluationReport) {
        self.passes += other.passes;
        self.initialized.extend(other.initialized);
        self.processed.extend(other.processed);
        self.not_ready.extend(other.not_ready);
        self.failed.extend(other.failed);
    }

    /// Nothing was visited.
    pub fn is_empty(&self) -> bool {
        self.passes == 0
    }
}

/// Result of one pass: the report plus requests queued by processors.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub report: EvaluationReport,
    pub requests: Vec<ProcessorRequest>,
}

pub struct Evaluator {
    exception_handler: ExceptionHandler,
    pass_count: u64,
    log_pass_timings: bool,
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            exception_handler: Box::new(log_exception),
            pass_count: 0,
            log_pass_timings: false,
        }
    }

    pub fn set_exception_handler(
        &mut self,
        handler: impl FnMut(ProcessorId, EvaluationType, &ExceptionContext) + 'static,
    ) {
        self.exception_handler = Box::new(handler);
    }

    pub fn reset_exception_handler(&mut self) {
        self.exception_handler = Box::new(log_exception);
    }

    pub fn set_log_pass_timings(&mut self, enabled: bool) {
        self.log_pass_timings = enabled;
    }

    /// Passes run so far that visited at least one processor.
    pub fn pass_count(&self) -> u64 {
        self.pass_count
    }

    /// Run one pass over everything that is invalid.
    pub fn run_pass(&mut self, arena: &mut ProcessorArena) -> PassOutcome {
        let start = Instant::now();
        let plan = graph::schedule(arena);
        if plan.is_empty() {
            return PassOutcome::default();
        }

        self.pass_count += 1;
        tracing::debug!(
            pass = self.pass_count,
            scheduled = plan.stats.scheduled_processors,
            invalid = plan.stats.invalid_processors,
            "Evaluation pass"
        );

        let mut outcome = PassOutcome {
            report: EvaluationReport {
                passes: 1,
                ..EvaluationReport::default()
            },
            requests: Vec::new(),
        };

        for &id in &plan.order {
            self.evaluate_processor(arena, id, &mut outcome);
        }

        if self.log_pass_timings {
            tracing::debug!(
                pass = self.pass_count,
                processed = outcome.report.processed.len(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "Evaluation pass finished"
            );
        }

        outcome
    }

    fn evaluate_processor(&mut self, arena: &mut ProcessorArena, id: ProcessorId, outcome: &mut PassOutcome) {
        let Some(slot) = arena.get_mut(id) else {
            return;
        };
        // Reached through a connection but never marked; still needs a run.
        if slot.invalidation_level == InvalidationLevel::Valid {
            slot.invalidation_level = InvalidationLevel::InvalidOutput;
        }
        let level = slot.invalidation_level;
        let identifier = slot.identifier().to_string();
        let Some(mut processor) = slot.processor.take() else {
            return;
        };

        let mut init_failed = false;
        if level >= InvalidationLevel::InvalidResources {
            tracing::trace!("initialize_resources: {}", identifier);
            let mut ctx = ProcessContext::new(arena, id);
            let result = processor.initialize_resources(&mut ctx);
            outcome.requests.extend(ctx.into_requests());
            match result {
                Ok(()) => outcome.report.initialized.push(id),
                Err(err) => {
                    self.report_failure(id, EvaluationType::InitResource, &identifier, &err, outcome);
                    init_failed = true;
                }
            }
        }

        // The processor box is out of its slot, so ask it directly.
        let ready = processor.is_ready(arena.inports_ready(id));
        let mut processed = false;
        if init_failed {
            tracing::trace!("skipping process after failed initialization: {}", identifier);
        } else if ready {
            tracing::trace!("process: {}", identifier);
            let mut ctx = ProcessContext::new(arena, id);
            let result = processor.process(&mut ctx);
            outcome.requests.extend(ctx.into_requests());
            match result {
                Ok(()) => {
                    outcome.report.processed.push(id);
                    processed = true;
                }
                Err(err) => {
                    self.report_failure(id, EvaluationType::Process, &identifier, &err, outcome)
                }
            }
        } else {
            tracing::trace!("do_if_not_ready: {}", identifier);
            let mut ctx = ProcessContext::new(arena, id);
            processor.do_if_not_ready(&mut ctx);
            outcome.requests.extend(ctx.into_requests());
            outcome.report.not_ready.push(id);
        }

        if let Some(slot) = arena.get_mut(id) {
            slot.processor = Some(processor);
        }
        Self::set_valid(arena, id, processed);
    }

    fn report_failure(
        &mut self,
        id: ProcessorId,
        kind: EvaluationType,
        identifier: &str,
        err: &ProcessorError,
        outcome: &mut PassOutcome,
    ) {
        let context = ExceptionContext {
            processor_identifier: identifier.to_string(),
            message: err.to_string(),
        };
        (self.exception_handler)(id, kind, &context);
        outcome.report.failed.push(id);
    }

    /// Reset the processor to `Valid`. Outports become valid; consumers are
    /// told about changed data and inports drop their changed flags only if
    /// `process` succeeded.
    fn set_valid(arena: &mut ProcessorArena, id: ProcessorId, processed: bool) {
        let Some(slot) = arena.get_mut(id) else {
            return;
        };
        slot.invalidation_level = InvalidationLevel::Valid;

        let mut notify = Vec::new();
        for port in &mut slot.outports {
            if port.set_valid() && processed {
                notify.extend(port.connected_inports().iter().map(|&inport| (inport, port.id())));
            }
        }
        for port in &mut slot.inports {
            port.set_valid();
            if processed {
                port.set_changed(false, None);
            }
        }

        for (inport, outport) in notify {
            if let Some(port) = arena.inport_mut(inport) {
                port.set_changed(true, Some(outport));
            }
        }
        arena.invalidate_processor_readiness(id);
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("pass_count", &self.pass_count)
            .field("log_pass_timings", &self.log_pass_timings)
            .finish()
    }
}
