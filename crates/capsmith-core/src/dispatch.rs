//! Plan dispatch: turns an activation plan into a lazy event sequence.
//!
//! [`Dispatch`] yields one [`ActivationEvent`] per plan entry in plan order.
//! Before each event it checks a [`CancellationToken`] and an optional
//! [`CostMeter`]; either one ends the sequence early and the remaining ids are
//! reported skipped. Early termination is a normal outcome, not an error.

use std::iter::FusedIterator;

use capsmith_types::plan::{ActivationEvent, ActivationPlan, DispatchOutcome, PlanEntry};
use tokio_util::sync::CancellationToken;

/// Percentage of the ceiling at which the meter warns.
const WARNING_PERCENT: f64 = 80.0;

/// Status returned after charging the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterStatus {
    /// Under the warning threshold.
    Ok,
    /// Just crossed 80% of the ceiling. Returned exactly once per meter.
    Warning,
    /// The charge would exceed the ceiling and was refused.
    Exhausted,
}

/// Running cost counter with an optional ceiling.
#[derive(Debug, Clone, Default)]
pub struct CostMeter {
    ceiling: Option<f64>,
    consumed: f64,
    warning_emitted: bool,
}

impl CostMeter {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(ceiling: f64) -> Self {
        Self {
            ceiling: Some(ceiling),
            ..Self::default()
        }
    }

    /// Charge `cost` unless it would push consumption past the ceiling.
    ///
    /// A refused charge leaves the meter unchanged.
    pub fn charge(&mut self, cost: f64) -> MeterStatus {
        let Some(ceiling) = self.ceiling else {
            self.consumed += cost;
            return MeterStatus::Ok;
        };

        let next = self.consumed + cost;
        if next > ceiling + 1e-9 {
            return MeterStatus::Exhausted;
        }

        let threshold = ceiling * WARNING_PERCENT / 100.0;
        let prev = self.consumed;
        self.consumed = next;

        if !self.warning_emitted && prev < threshold && next >= threshold {
            self.warning_emitted = true;
            return MeterStatus::Warning;
        }
        MeterStatus::Ok
    }

    pub fn consumed(&self) -> f64 {
        self.consumed
    }

    pub fn ceiling(&self) -> Option<f64> {
        self.ceiling
    }

    /// Cost left before the ceiling, `None` when unbounded.
    pub fn remaining(&self) -> Option<f64> {
        self.ceiling.map(|c| (c - self.consumed).max(0.0))
    }

    /// Percentage of the ceiling consumed (0.0 to 100.0). Zero when unbounded.
    pub fn percentage(&self) -> f64 {
        match self.ceiling {
            None => 0.0,
            Some(c) if c <= 0.0 => 100.0,
            Some(c) => self.consumed / c * 100.0,
        }
    }
}

/// Lazy, finite, single-pass event sequence over an activation plan.
///
/// Consumes the plan; a finished or cancelled dispatch cannot be restarted.
/// Call [`Dispatch::outcome`] afterwards for the completed/skipped accounting.
#[derive(Debug)]
pub struct Dispatch {
    entries: std::vec::IntoIter<PlanEntry>,
    index: usize,
    cancel: CancellationToken,
    meter: CostMeter,
    completed: Vec<String>,
    skipped: Vec<String>,
    cancelled: bool,
    budget_exhausted: bool,
}

impl Dispatch {
    pub fn new(plan: ActivationPlan, cancel: CancellationToken) -> Self {
        Self {
            entries: plan.entries.into_iter(),
            index: 0,
            cancel,
            meter: CostMeter::unbounded(),
            completed: Vec::new(),
            skipped: Vec::new(),
            cancelled: false,
            budget_exhausted: false,
        }
    }

    pub fn with_meter(mut self, meter: CostMeter) -> Self {
        self.meter = meter;
        self
    }

    pub fn meter(&self) -> &CostMeter {
        &self.meter
    }

    /// Final accounting.
    ///
    /// Entries not yet emitted are reported skipped, so stopping iteration
    /// early without cancelling still yields a complete outcome.
    pub fn outcome(mut self) -> DispatchOutcome {
        if !self.cancelled && self.cancel.is_cancelled() && self.entries.len() > 0 {
            self.cancelled = true;
        }
        self.skip_rest();
        DispatchOutcome {
            completed: self.completed,
            skipped: self.skipped,
            cancelled: self.cancelled,
            budget_exhausted: self.budget_exhausted,
        }
    }

    fn skip_rest(&mut self) {
        self.skipped.extend(self.entries.by_ref().map(|e| e.id));
    }
}

impl Iterator for Dispatch {
    type Item = ActivationEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.entries.len() == 0 {
            return None;
        }

        if self.cancel.is_cancelled() {
            self.cancelled = true;
            self.skip_rest();
            tracing::info!(
                completed = self.completed.len(),
                skipped = self.skipped.len(),
                "dispatch cancelled"
            );
            return None;
        }

        let entry = self.entries.next()?;
        match self.meter.charge(entry.cost) {
            MeterStatus::Exhausted => {
                self.budget_exhausted = true;
                self.skipped.push(entry.id);
                self.skip_rest();
                tracing::warn!(
                    consumed = self.meter.consumed(),
                    ceiling = ?self.meter.ceiling(),
                    skipped = self.skipped.len(),
                    "dispatch cost ceiling reached"
                );
                return None;
            }
            MeterStatus::Warning => {
                tracing::warn!(
                    consumed = self.meter.consumed(),
                    percentage = format_args!("{:.1}", self.meter.percentage()),
                    "dispatch cost above 80% of ceiling"
                );
            }
            MeterStatus::Ok => {}
        }

        let event = ActivationEvent {
            index: self.index,
            id: entry.id.clone(),
            kind: entry.kind,
            cost: entry.cost,
            cumulative_cost: entry.cumulative_cost,
        };
        self.index += 1;
        self.completed.push(entry.id);
        tracing::trace!(id = %event.id, index = event.index, "activation event emitted");
        Some(event)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.entries.len()))
    }
}

impl FusedIterator for Dispatch {}

/// Start dispatching `plan`, observing `cancel` between events.
pub fn dispatch(plan: ActivationPlan, cancel: CancellationToken) -> Dispatch {
    Dispatch::new(plan, cancel)
}
