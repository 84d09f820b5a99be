//! The append-only diagnostics log of non-fatal pass decisions.
//!
//! Passes record what they did and what they declined to do; nothing in here
//! ever aborts the pipeline. The log is lock-free so intra-pass workers can
//! append concurrently; consumers drain a snapshot sorted by entity identity,
//! which keeps reports deterministic regardless of append interleaving.

use strum::Display;

use crate::model::ItemId;

/// What kind of decision an event records.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum EventKind {
    /// A call site was inlined.
    Inlined,
    /// A call site was considered and declined.
    NotInlined,
    /// Two classes were merged.
    ClassMerged,
    /// A merge candidate pair was rejected.
    MergeRejected,
    /// A companion class was synthesized for an interface.
    CompanionSynthesized,
    /// A default-method forwarder was synthesized on a class.
    ForwarderSynthesized,
}

/// One recorded decision.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Event {
    /// The kind of decision.
    pub kind: EventKind,
    /// The entity the decision is about.
    pub item: ItemId,
    /// Free-form detail (target, reason).
    pub detail: String,
}

/// Append-only, thread-safe event log.
#[derive(Debug, Default)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        EventLog {
            events: boxcar::Vec::new(),
        }
    }

    /// Appends one event. Takes `&self`; safe from parallel workers.
    pub fn record(&self, kind: EventKind, item: ItemId, detail: impl Into<String>) {
        self.events.push(Event {
            kind,
            item,
            detail: detail.into(),
        });
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Returns `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all events sorted by (kind, item, detail) for deterministic
    /// reporting.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.iter().map(|(_, e)| e.clone()).collect();
        events.sort_by(|a, b| {
            (a.kind, &a.item, &a.detail).cmp(&(b.kind, &b.item, &b.detail))
        });
        events
    }

    /// Counts events of one kind.
    #[must_use]
    pub fn count_of(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }
}
