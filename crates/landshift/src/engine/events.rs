//! Event types and sinks for observing simulation runs.
//!
//! The engine reports per-cell transitions and run milestones through an
//! [`EventSink`]; the hosting application decides how to store them. Sinks
//! declare interest per [`SimEventKind`] so the engine can skip building
//! events nobody wants.
use crate::grid::{CellId, StratumId, TransitionGroupId, TransitionTypeId};

/// Discriminant for [`SimEvent`], used by [`EventSink::wants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEventKind {
    RunStarted,
    RunFinished,
    TimestepStarted,
    TimestepFinished,
    CellTransitioned,
    PatchGrown,
    Warning,
}

/// Describes events emitted while a simulation runs.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum SimEvent {
    /// Emitted when an iteration begins.
    RunStarted {
        iteration: i32,
        min_timestep: i32,
        max_timestep: i32,
    },

    /// Emitted when an iteration completes.
    RunFinished {
        iteration: i32,
    },

    /// Emitted when a timestep begins.
    TimestepStarted {
        iteration: i32,
        timestep: i32,
    },

    /// Emitted when a timestep completes.
    TimestepFinished {
        iteration: i32,
        timestep: i32,
        /// Number of cells that transitioned during the timestep.
        transitioned_cells: usize,
    },

    /// Emitted for every committed cell transition.
    CellTransitioned {
        cell_id: CellId,
        stratum_id: StratumId,
        transition_type_id: TransitionTypeId,
        transition_group_id: TransitionGroupId,
        iteration: i32,
        timestep: i32,
    },

    /// Emitted when a patch finishes growing.
    PatchGrown {
        transition_group_id: TransitionGroupId,
        stratum_id: StratumId,
        iteration: i32,
        timestep: i32,
        initiation_cell: CellId,
        /// Number of cells committed to the patch.
        cells: usize,
        /// Area the event was asked to grow.
        target_amount: f64,
        /// Area actually grown.
        grown_amount: f64,
    },

    /// Non-fatal warning generated during a run.
    Warning {
        /// Context string (e.g. stratum id, group id).
        context: String,
        /// Human-readable message.
        message: String,
    },
}

impl SimEvent {
    pub fn kind(&self) -> SimEventKind {
        match self {
            SimEvent::RunStarted { .. } => SimEventKind::RunStarted,
            SimEvent::RunFinished { .. } => SimEventKind::RunFinished,
            SimEvent::TimestepStarted { .. } => SimEventKind::TimestepStarted,
            SimEvent::TimestepFinished { .. } => SimEventKind::TimestepFinished,
            SimEvent::CellTransitioned { .. } => SimEventKind::CellTransitioned,
            SimEvent::PatchGrown { .. } => SimEventKind::PatchGrown,
            SimEvent::Warning { .. } => SimEventKind::Warning,
        }
    }
}

/// A generic event sink that accepts [`SimEvent`]s.
pub trait EventSink {
    fn send(&mut self, event: SimEvent);

    /// Whether the sink cares about a kind of event. The engine skips
    /// assembling events the sink does not want.
    fn wants(&self, _kind: SimEventKind) -> bool {
        true
    }
}

/// A no-op event sink.
impl EventSink for () {
    #[inline]
    fn send(&mut self, _event: SimEvent) {}

    #[inline]
    fn wants(&self, _kind: SimEventKind) -> bool {
        false
    }
}

/// An event sink that forwards to a user-provided closure.
pub struct FnSink<F>
where
    F: FnMut(SimEvent),
{
    f: F,
}

impl<F> FnSink<F>
where
    F: FnMut(SimEvent),
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventSink for FnSink<F>
where
    F: FnMut(SimEvent),
{
    #[inline]
    fn send(&mut self, event: SimEvent) {
        (self.f)(event);
    }
}

/// An event sink that collects all events in a `Vec`.
#[derive(Default)]
pub struct VecSink {
    events: Vec<SimEvent>,
}

impl VecSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn into_inner(self) -> Vec<SimEvent> {
        self.events
    }

    pub fn as_slice(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for VecSink {
    #[inline]
    fn send(&mut self, event: SimEvent) {
        self.events.push(event);
    }
}

/// Fan-out sink that forwards each event to all contained sinks.
pub struct MultiSink<S: EventSink> {
    sinks: Vec<S>,
}

impl<S: EventSink> MultiSink<S> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sinks(sinks: Vec<S>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: S) {
        self.sinks.push(sink);
    }

    pub fn sinks(&self) -> &[S] {
        &self.sinks
    }
}

impl<S: EventSink> Default for MultiSink<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSink> EventSink for MultiSink<S> {
    fn send(&mut self, event: SimEvent) {
        if self.sinks.is_empty() {
            return;
        }
        let last_idx = self.sinks.len() - 1;
        for i in 0..last_idx {
            self.sinks[i].send(event.clone());
        }
        self.sinks[last_idx].send(event);
    }

    fn wants(&self, kind: SimEventKind) -> bool {
        self.sinks.iter().any(|s| s.wants(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning() -> SimEvent {
        SimEvent::Warning {
            context: "ctx".into(),
            message: "msg".into(),
        }
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(warning().kind(), SimEventKind::Warning);
        let event = SimEvent::CellTransitioned {
            cell_id: 0,
            stratum_id: 1,
            transition_type_id: 2,
            transition_group_id: 3,
            iteration: 1,
            timestep: 0,
        };
        assert_eq!(event.kind(), SimEventKind::CellTransitioned);
    }

    #[test]
    fn noop_sink_wants_nothing() {
        let sink = ();
        assert!(!sink.wants(SimEventKind::CellTransitioned));
    }

    #[test]
    fn vec_sink_collects_events() {
        let mut sink = VecSink::new();
        assert!(sink.is_empty());
        sink.send(warning());
        sink.send(warning());
        assert_eq!(sink.len(), 2);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn fn_sink_invokes_callback() {
        let mut count = 0;
        let mut sink = FnSink::new(|_event| {
            count += 1;
        });
        sink.send(warning());
        assert_eq!(count, 1);
    }

    #[test]
    fn multi_sink_fans_out_events() {
        let mut multi = MultiSink::with_sinks(vec![VecSink::new(), VecSink::new()]);
        multi.send(warning());
        assert_eq!(multi.sinks()[0].len(), 1);
        assert_eq!(multi.sinks()[1].len(), 1);
        assert!(multi.wants(SimEventKind::Warning));
    }
}
