//! Queue snapshots: validated, aggregated counts from the state sources.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{FixtureError, Result};

/// Raw counts reported by a source, keyed by work kind.
///
/// Values are signed so that a collaborator's counting bug (a negative
/// count) reaches the validator instead of wrapping around.
pub type CountsByKind = BTreeMap<String, i64>;

/// Name used in diagnostics for the pending-work source.
pub const QUEUE_SOURCE: &str = "queue";
/// Name used in diagnostics for the processing source.
pub const PROCESSING_SOURCE: &str = "processing";

/// Point-in-time view of the background work, recomputed on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// Items enqueued but not started, summed across kinds.
    pub pending: u64,
    /// Items started but not completed, summed across kinds.
    pub processing: u64,
    /// Per-kind pending counts as reported.
    pub pending_by_kind: BTreeMap<String, u64>,
    /// Per-kind processing counts as reported.
    pub processing_by_kind: BTreeMap<String, u64>,
}

impl QueueSnapshot {
    /// Validate and aggregate raw counts.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::InvariantViolation`] for any negative count and
    /// [`FixtureError::CountOverflow`] if a sum does not fit in `u64`.
    pub fn from_counts(pending: &CountsByKind, processing: &CountsByKind) -> Result<Self> {
        let (pending, pending_by_kind) = aggregate(QUEUE_SOURCE, pending)?;
        let (processing, processing_by_kind) = aggregate(PROCESSING_SOURCE, processing)?;
        Ok(Self {
            pending,
            processing,
            pending_by_kind,
            processing_by_kind,
        })
    }

    /// True when nothing is pending and nothing is processing.
    #[must_use]
    pub const fn is_quiescent(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }

    /// Total outstanding items.
    #[must_use]
    pub const fn outstanding(&self) -> u64 {
        self.pending.saturating_add(self.processing)
    }
}

fn aggregate(
    source_name: &'static str,
    counts: &CountsByKind,
) -> Result<(u64, BTreeMap<String, u64>)> {
    let mut total: u64 = 0;
    let mut by_kind = BTreeMap::new();

    for (kind, &count) in counts {
        let count = u64::try_from(count).map_err(|_| FixtureError::InvariantViolation {
            source_name,
            kind: kind.clone(),
            count,
        })?;
        total = total
            .checked_add(count)
            .ok_or(FixtureError::CountOverflow { source_name })?;
        by_kind.insert(kind.clone(), count);
    }

    Ok((total, by_kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, i64)]) -> CountsByKind {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn aggregates_across_kinds() {
        let snapshot = QueueSnapshot::from_counts(
            &counts(&[("immediate", 2), ("deferred", 3)]),
            &counts(&[("immediate", 1)]),
        )
        .unwrap();

        assert_eq!(snapshot.pending, 5);
        assert_eq!(snapshot.processing, 1);
        assert_eq!(snapshot.outstanding(), 6);
        assert_eq!(snapshot.pending_by_kind["deferred"], 3);
        assert!(!snapshot.is_quiescent());
    }

    #[test]
    fn empty_sources_are_quiescent() {
        let snapshot =
            QueueSnapshot::from_counts(&CountsByKind::new(), &CountsByKind::new()).unwrap();
        assert!(snapshot.is_quiescent());
    }

    #[test]
    fn zero_counts_are_quiescent() {
        let snapshot = QueueSnapshot::from_counts(
            &counts(&[("immediate", 0), ("deferred", 0)]),
            &counts(&[("immediate", 0), ("deferred", 0)]),
        )
        .unwrap();
        assert!(snapshot.is_quiescent());
    }

    #[test]
    fn negative_pending_is_invariant_violation() {
        let err = QueueSnapshot::from_counts(
            &counts(&[("immediate", 1), ("deferred", -1)]),
            &CountsByKind::new(),
        )
        .unwrap_err();

        match err {
            FixtureError::InvariantViolation {
                source_name,
                kind,
                count,
            } => {
                assert_eq!(source_name, QUEUE_SOURCE);
                assert_eq!(kind, "deferred");
                assert_eq!(count, -1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn negative_processing_is_not_clamped() {
        // A negative processing count must not cancel out pending work.
        let err = QueueSnapshot::from_counts(
            &counts(&[("immediate", 1)]),
            &counts(&[("immediate", -1)]),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FixtureError::InvariantViolation {
                source_name: PROCESSING_SOURCE,
                ..
            }
        ));
    }

    #[test]
    fn overflow_is_reported() {
        let err = QueueSnapshot::from_counts(
            &counts(&[("a", i64::MAX), ("b", i64::MAX), ("c", i64::MAX)]),
            &CountsByKind::new(),
        )
        .unwrap_err();
        assert!(matches!(err, FixtureError::CountOverflow { .. }));
    }
}
