//! Per-dialog invoke id allocation and deadline tracking

use crate::cap::OperationKind;
use crate::errors::{CapError, Result};
use crate::tcap::RejectProblem;
use crate::types::{DialogId, InvokeId};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use tokio::time::Instant;
use tracing::debug;

/// Final outcome of an invoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// ReturnResultLast, with the raw result parameter if any
    Result { parameter: Option<Bytes> },
    /// ReturnError
    Error { code: i32, parameter: Option<Bytes> },
    /// Reject naming this invoke
    Rejected(RejectProblem),
    TimedOut,
    /// Force-resolved by a local close or a peer abort
    Aborted,
}

impl InvokeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Result { .. })
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
            Self::Rejected(_) => "rejected",
            Self::TimedOut => "timed_out",
            Self::Aborted => "aborted",
        }
    }
}

/// An invoke removed from the in-flight set together with its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInvoke {
    pub invoke_id: InvokeId,
    pub kind: OperationKind,
    pub outcome: InvokeOutcome,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    kind: OperationKind,
    deadline: Instant,
}

/// In-flight invokes of one dialog.
///
/// Ids are handed out lowest-available within `[min, max]`; an id becomes
/// reusable as soon as its invoke resolves.
#[derive(Debug)]
pub struct InvokeTracker {
    dialog: DialogId,
    min: i8,
    max: i8,
    in_flight: BTreeMap<InvokeId, InFlight>,
    deadlines: BTreeSet<(Instant, InvokeId)>,
}

impl InvokeTracker {
    pub const DEFAULT_MIN: i8 = 0;
    pub const DEFAULT_MAX: i8 = 127;

    pub fn new(dialog: DialogId) -> Self {
        Self::with_range(dialog, Self::DEFAULT_MIN, Self::DEFAULT_MAX)
    }

    pub fn with_range(dialog: DialogId, min: i8, max: i8) -> Self {
        Self {
            dialog,
            min: min.min(max),
            max: max.max(min),
            in_flight: BTreeMap::new(),
            deadlines: BTreeSet::new(),
        }
    }

    /// Reserve the lowest free id, expiring at `deadline`
    pub fn allocate(&mut self, kind: OperationKind, deadline: Instant) -> Result<InvokeId> {
        let id = (self.min..=self.max)
            .map(InvokeId)
            .find(|id| !self.in_flight.contains_key(id))
            .ok_or(CapError::NoInvokeIdAvailable(self.dialog))?;

        self.in_flight.insert(id, InFlight { kind, deadline });
        self.deadlines.insert((deadline, id));
        debug!(dialog = %self.dialog, invoke = %id, %kind, "Allocated invoke id");
        Ok(id)
    }

    /// Resolve an in-flight invoke. Unknown ids (late or duplicate
    /// resolutions) are ignored.
    pub fn resolve(&mut self, id: InvokeId, outcome: InvokeOutcome) -> Option<ResolvedInvoke> {
        match self.take(id) {
            Some(entry) => Some(ResolvedInvoke {
                invoke_id: id,
                kind: entry.kind,
                outcome,
            }),
            None => {
                debug!(dialog = %self.dialog, invoke = %id, "Resolution for invoke not in flight");
                None
            }
        }
    }

    /// Lazily drain invokes whose deadline is at or before `now`, earliest first
    pub fn expire(&mut self, now: Instant) -> impl Iterator<Item = ResolvedInvoke> + '_ {
        std::iter::from_fn(move || loop {
            let &(deadline, id) = self.deadlines.first()?;
            if deadline > now {
                return None;
            }
            self.deadlines.pop_first();
            if let Some(entry) = self.in_flight.remove(&id) {
                return Some(ResolvedInvoke {
                    invoke_id: id,
                    kind: entry.kind,
                    outcome: InvokeOutcome::TimedOut,
                });
            }
        })
    }

    /// Undo an allocation whose send failed
    pub fn release(&mut self, id: InvokeId) -> bool {
        self.take(id).is_some()
    }

    /// Drain every in-flight invoke as Aborted, in id order
    pub fn abort_all(&mut self) -> Vec<ResolvedInvoke> {
        self.deadlines.clear();
        std::mem::take(&mut self.in_flight)
            .into_iter()
            .map(|(invoke_id, entry)| ResolvedInvoke {
                invoke_id,
                kind: entry.kind,
                outcome: InvokeOutcome::Aborted,
            })
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, id: InvokeId) -> bool {
        self.in_flight.contains_key(&id)
    }

    pub fn kind_of(&self, id: InvokeId) -> Option<OperationKind> {
        self.in_flight.get(&id).map(|e| e.kind)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    fn take(&mut self, id: InvokeId) -> Option<InFlight> {
        let entry = self.in_flight.remove(&id)?;
        self.deadlines.remove(&(entry.deadline, id));
        Some(entry)
    }
}
