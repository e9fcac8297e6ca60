//! Per-worker all-time-high tracking
//!
//! The tracker holds one high-water mark per raw worker name. A worker's
//! first observation only records a baseline; notifications are reserved
//! for strict increases over a value already on record.

use std::collections::BTreeMap;

/// Raw worker name -> best share ever observed
pub type Records = BTreeMap<String, u64>;

/// Outcome of evaluating one worker observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No usable value or empty name; nothing recorded
    Ignore,
    /// Baseline recorded for a worker never seen before; no notification
    FirstSeen,
    /// Strictly higher than the stored record; caller must notify
    NewRecord { previous: u64, current: u64 },
    /// Equal to or below the stored record
    NoChange,
}

impl Decision {
    /// Whether this decision modified the stored records
    pub fn changed(&self) -> bool {
        matches!(self, Decision::FirstSeen | Decision::NewRecord { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTracker {
    records: Records,
}

impl RecordTracker {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Records) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    #[cfg(test)]
    pub fn get(&self, raw_name: &str) -> Option<u64> {
        self.records.get(raw_name).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Evaluate one observation and update the stored record when it is
    /// a first sighting or a strict increase.
    pub fn evaluate(&mut self, raw_name: &str, observed_best: Option<u64>) -> Decision {
        let Some(observed) = observed_best else {
            return Decision::Ignore;
        };
        if raw_name.trim().is_empty() {
            return Decision::Ignore;
        }

        match self.records.get_mut(raw_name) {
            None => {
                self.records.insert(raw_name.to_string(), observed);
                Decision::FirstSeen
            }
            Some(stored) if observed > *stored => {
                let previous = *stored;
                *stored = observed;
                Decision::NewRecord {
                    previous,
                    current: observed,
                }
            }
            Some(_) => Decision::NoChange,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_first_sighting_records_baseline() {
        let mut tracker = RecordTracker::new();

        assert_eq!(tracker.evaluate("addr.rig1", Some(500)), Decision::FirstSeen);
        assert_eq!(tracker.get("addr.rig1"), Some(500));
        assert!(Decision::FirstSeen.changed());
    }

    #[test]
    fn test_ignore_absent_value_and_blank_name() {
        let mut tracker = RecordTracker::new();

        assert_eq!(tracker.evaluate("addr.rig1", None), Decision::Ignore);
        assert_eq!(tracker.evaluate("", Some(10)), Decision::Ignore);
        assert_eq!(tracker.evaluate("   ", Some(10)), Decision::Ignore);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_new_record_only_on_strict_increase() {
        let mut tracker = RecordTracker::from_records(Records::from([("w".to_string(), 500)]));

        assert_eq!(tracker.evaluate("w", Some(500)), Decision::NoChange);
        assert_eq!(tracker.evaluate("w", Some(499)), Decision::NoChange);
        assert_eq!(
            tracker.evaluate("w", Some(501)),
            Decision::NewRecord {
                previous: 500,
                current: 501
            }
        );
        assert_eq!(tracker.get("w"), Some(501));
    }

    #[test]
    fn test_never_regresses() {
        let mut tracker = RecordTracker::new();
        tracker.evaluate("w", Some(750));

        // Upstream restarts report a lower best for a while
        assert_eq!(tracker.evaluate("w", Some(3)), Decision::NoChange);
        assert_eq!(tracker.evaluate("w", Some(0)), Decision::NoChange);
        assert_eq!(tracker.get("w"), Some(750));
    }

    #[test]
    fn test_record_is_running_maximum() {
        let observations = [40u64, 12, 40, 90, 89, 1000, 7, 1001, 1001, 3];
        let mut tracker = RecordTracker::new();
        let mut max_seen = 0;
        let mut notifications = 0;

        for (i, value) in observations.into_iter().enumerate() {
            let decision = tracker.evaluate("rig", Some(value));
            if i > 0 && value > max_seen {
                assert!(matches!(decision, Decision::NewRecord { .. }));
            }
            if matches!(decision, Decision::NewRecord { .. }) {
                notifications += 1;
            }
            max_seen = max_seen.max(value);
            assert_eq!(tracker.get("rig"), Some(max_seen));
        }

        // 90, 1000, 1001
        assert_eq!(notifications, 3);
    }

    #[test]
    fn test_names_are_case_sensitive_and_independent() {
        let mut tracker = RecordTracker::new();
        tracker.evaluate("addr.Rig", Some(100));
        tracker.evaluate("addr.rig", Some(5));

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.evaluate("addr.rig", Some(6)), Decision::NewRecord { previous: 5, current: 6 });
        assert_eq!(tracker.get("addr.Rig"), Some(100));
    }

    fn observations_strategy() -> impl Strategy<Value = Vec<(String, Option<u64>)>> {
        let name = prop::sample::select(vec!["addr.rig1", "addr.rig2", "addr.Rig1", "solo", " ", ""])
            .prop_map(str::to_string);
        let best = prop::option::of(prop_oneof![0u64..1_000, any::<u64>()]);
        prop::collection::vec((name, best), 0..64)
    }

    proptest! {
        #[test]
        fn test_records_track_running_maximum(observations in observations_strategy()) {
            let mut tracker = RecordTracker::new();
            let mut expected: HashMap<String, u64> = HashMap::new();

            for (name, best) in &observations {
                let previous = expected.get(name).copied();
                let decision = tracker.evaluate(name, *best);

                match (*best, previous) {
                    (None, _) => prop_assert_eq!(decision, Decision::Ignore),
                    (Some(_), _) if name.trim().is_empty() => prop_assert_eq!(decision, Decision::Ignore),
                    (Some(_), None) => prop_assert_eq!(decision, Decision::FirstSeen),
                    (Some(value), Some(stored)) if value > stored => prop_assert_eq!(
                        decision,
                        Decision::NewRecord { previous: stored, current: value }
                    ),
                    (Some(_), Some(_)) => prop_assert_eq!(decision, Decision::NoChange),
                }

                if let Some(value) = best {
                    if !name.trim().is_empty() {
                        let entry = expected.entry(name.clone()).or_insert(*value);
                        *entry = (*entry).max(*value);
                    }
                }
            }

            let expected: Records = expected.into_iter().collect();
            prop_assert_eq!(tracker.records(), &expected);
        }
    }
}
