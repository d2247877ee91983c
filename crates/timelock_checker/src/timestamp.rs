use {
    crate::{CheckError, CheckResult, Checker, Evidence},
    std::collections::BTreeSet,
    timelock_core::{Event, EventHistory},
    tracing::debug,
};

/// Checks the timestamp half of the oracle.
///
/// 1. Real-time order: when A completed before B was invoked, everything A returned must be
///    below everything B returned. Each offending B is reported once, against the earlier
///    operation that returned the largest value.
/// 2. Disjointness: no two operations may return overlapping timestamps. Every overlapping
///    pair is reported once, and overlaps already reported as real-time violations are not
///    repeated.
/// 3. Liveness: every nemesis episode must see a timestamp operation that was invoked at or
///    after the episode's `start` and succeeded no later than `liveness_grace` after its
///    `stop`. A failing episode is reported as its `start` and `stop` markers.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimestampChecker {
    liveness_grace: u64,
}

/// A successful operation that returned timestamps.
struct Issued<'a> {
    invoke: &'a Event,
    ok: &'a Event,
    ok_index: usize,
    lower: i64,
    upper: i64,
}

impl TimestampChecker {
    pub fn new(liveness_grace: u64) -> Self {
        TimestampChecker { liveness_grace }
    }

    fn issued<'a>(&self, history: &'a EventHistory) -> Result<Vec<Issued<'a>>, CheckError> {
        let mut issued = Vec::new();
        for op in history.operations() {
            if !op.function().issues_timestamps() {
                continue;
            }
            let (Some(ok), Some(ok_index)) = (op.ok(), op.completion_index) else {
                continue;
            };
            let (lower, upper) =
                ok.value
                    .as_range()
                    .ok_or_else(|| CheckError::MalformedValue {
                        checker: self.name().to_string(),
                        index: ok_index,
                        value: ok.value.clone(),
                    })?;
            issued.push(Issued {
                invoke: op.invoke,
                ok,
                ok_index,
                lower,
                upper,
            });
        }
        Ok(issued)
    }

    fn real_time_violations(
        issued: &[Issued<'_>],
        reported: &mut BTreeSet<(usize, usize)>,
    ) -> Vec<Evidence> {
        let mut by_completion: Vec<&Issued<'_>> = issued.iter().collect();
        by_completion.sort_by_key(|i| (i.ok.time, i.ok_index));

        // `issued` is in invocation order, so a single sweep over completions suffices.
        let mut errors = Vec::new();
        let mut completed = by_completion.into_iter().peekable();
        let mut highest: Option<&Issued<'_>> = None;
        for later in issued {
            while let Some(earlier) = completed.next_if(|e| e.ok.time < later.invoke.time) {
                if highest.map_or(true, |h| earlier.upper > h.upper) {
                    highest = Some(earlier);
                }
            }
            if let Some(earlier) = highest {
                if earlier.upper >= later.lower {
                    reported.insert(pair_key(earlier, later));
                    errors.push(Evidence::Pair(earlier.ok.clone(), later.ok.clone()));
                }
            }
        }
        errors
    }

    fn overlaps(issued: &[Issued<'_>], reported: &BTreeSet<(usize, usize)>) -> Vec<Evidence> {
        let mut by_lower: Vec<&Issued<'_>> = issued.iter().collect();
        by_lower.sort_by_key(|i| (i.lower, i.ok_index));

        // Ranges whose upper bound the sweep has not yet passed.
        let mut active: Vec<&Issued<'_>> = Vec::new();
        let mut errors = Vec::new();
        for current in by_lower {
            active.retain(|previous| previous.upper >= current.lower);
            for &previous in &active {
                if reported.contains(&pair_key(previous, current)) {
                    continue;
                }
                let (first, second) = if previous.ok_index < current.ok_index {
                    (previous, current)
                } else {
                    (current, previous)
                };
                errors.push(Evidence::Pair(first.ok.clone(), second.ok.clone()));
            }
            active.push(current);
        }
        errors
    }

    fn liveness_violations(&self, history: &EventHistory) -> Vec<Evidence> {
        let progress: Vec<(u64, u64)> = history
            .operations()
            .filter(|op| op.function().is_timestamp_op())
            .filter_map(|op| op.ok().map(|ok| (op.invoke.time, ok.time)))
            .collect();

        let mut errors = Vec::new();
        for episode in history.nemesis_episodes() {
            let deadline = episode
                .stop
                .map_or(u64::MAX, |stop| stop.time.saturating_add(self.liveness_grace));
            let progressed = progress
                .iter()
                .any(|&(invoked, completed)| episode.start.time <= invoked && completed <= deadline);
            if progressed {
                continue;
            }
            debug!(start = episode.start.time, "No progress during nemesis episode.");
            errors.push(Evidence::Event(episode.start.clone()));
            if let Some(stop) = episode.stop {
                errors.push(Evidence::Event(stop.clone()));
            }
        }
        errors
    }
}

fn pair_key(a: &Issued<'_>, b: &Issued<'_>) -> (usize, usize) {
    (a.ok_index.min(b.ok_index), a.ok_index.max(b.ok_index))
}

impl Checker for TimestampChecker {
    fn name(&self) -> &str {
        "timestamp"
    }

    fn check(&self, history: &EventHistory) -> Result<CheckResult, CheckError> {
        let issued = self.issued(history)?;
        let mut reported = BTreeSet::new();
        let mut errors = Self::real_time_violations(&issued, &mut reported);
        errors.extend(Self::overlaps(&issued, &reported));
        errors.extend(self.liveness_violations(history));
        Ok(CheckResult::from_errors(errors))
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        timelock_core::{Event, Function},
    };

    fn check(events: Vec<Event>) -> Vec<String> {
        let history = EventHistory::new(events).unwrap();
        TimestampChecker::default()
            .check(&history)
            .unwrap()
            .errors
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn accepts_increasing_timestamps_from_concurrent_clients() {
        let errors = check(vec![
            Event::invoke(0, Function::GetTimestamp, (), 1),
            Event::invoke(1, Function::GetTimestamps, 3, 2),
            Event::ok(1, Function::GetTimestamps, vec![1, 3], 3),
            Event::ok(0, Function::GetTimestamp, 4, 4),
            Event::invoke(1, Function::GetTimestamp, (), 5),
            Event::ok(1, Function::GetTimestamp, 5, 6),
        ]);
        assert_eq!(errors, Vec::<String>::new());
    }

    #[test]
    fn concurrent_operations_may_complete_out_of_order() {
        // Neither operation finished before the other started.
        let errors = check(vec![
            Event::invoke(0, Function::GetTimestamp, (), 1),
            Event::invoke(1, Function::GetTimestamp, (), 2),
            Event::ok(0, Function::GetTimestamp, 9, 3),
            Event::ok(1, Function::GetTimestamp, 8, 4),
        ]);
        assert_eq!(errors, Vec::<String>::new());
    }

    #[test]
    fn cites_the_largest_earlier_value_once_per_offender() {
        let errors = check(vec![
            Event::invoke(0, Function::GetTimestamp, (), 1),
            Event::ok(0, Function::GetTimestamp, 10, 2),
            Event::invoke(1, Function::GetTimestamps, 2, 3),
            Event::ok(1, Function::GetTimestamps, vec![20, 21], 4),
            Event::invoke(2, Function::GetTimestamp, (), 5),
            Event::ok(2, Function::GetTimestamp, 15, 6),
        ]);
        assert_eq!(
            errors,
            vec![":1 ok get-timestamps [20 21]@4 → :2 ok get-timestamp 15@6"]
        );
    }

    #[test]
    fn reports_concurrent_overlaps_but_not_real_time_ones_twice() {
        let errors = check(vec![
            Event::invoke(0, Function::GetTimestamps, 3, 1),
            Event::invoke(1, Function::GetTimestamps, 3, 2),
            Event::ok(0, Function::GetTimestamps, vec![1, 3], 3),
            Event::ok(1, Function::GetTimestamps, vec![3, 5], 4),
            Event::invoke(2, Function::GetTimestamp, (), 5),
            Event::ok(2, Function::GetTimestamp, 5, 6),
        ]);
        assert_eq!(
            errors,
            vec![
                ":1 ok get-timestamps [3 5]@4 → :2 ok get-timestamp 5@6",
                ":0 ok get-timestamps [1 3]@3 → :1 ok get-timestamps [3 5]@4",
            ]
        );
    }

    #[test]
    fn reports_every_overlapping_pair() {
        let errors = check(vec![
            Event::invoke(0, Function::GetTimestamps, 10, 1),
            Event::invoke(1, Function::GetTimestamps, 5, 2),
            Event::invoke(2, Function::GetTimestamps, 3, 3),
            Event::ok(0, Function::GetTimestamps, vec![1, 10], 4),
            Event::ok(1, Function::GetTimestamps, vec![2, 6], 5),
            Event::ok(2, Function::GetTimestamps, vec![5, 7], 6),
        ]);
        assert_eq!(
            errors,
            vec![
                ":0 ok get-timestamps [1 10]@4 → :1 ok get-timestamps [2 6]@5",
                ":0 ok get-timestamps [1 10]@4 → :2 ok get-timestamps [5 7]@6",
                ":1 ok get-timestamps [2 6]@5 → :2 ok get-timestamps [5 7]@6",
            ]
        );
    }

    #[test]
    fn reports_episodes_without_progress() {
        let errors = check(vec![
            Event::invoke(0, Function::GetTimestamp, (), 1),
            Event::ok(0, Function::GetTimestamp, 1, 2),
            Event::nemesis(Function::Start, "start!", 3),
            Event::invoke(0, Function::GetTimestamp, (), 4),
            Event::fail(0, Function::GetTimestamp, (), 5),
            Event::nemesis(Function::Stop, "stop!", 6),
            Event::nemesis(Function::Start, "start!", 7),
            Event::invoke(0, Function::FastForward, 100, 8),
            Event::ok(0, Function::FastForward, 100, 9),
            Event::nemesis(Function::Stop, "stop!", 10),
            Event::nemesis(Function::Start, "start!", 11),
        ]);
        assert_eq!(
            errors,
            vec![
                "nemesis info start \"start!\"@3",
                "nemesis info stop \"stop!\"@6",
                "nemesis info start \"start!\"@11",
            ]
        );
    }

    #[test]
    fn grace_window_extends_past_the_stop() {
        let history = EventHistory::new(vec![
            Event::nemesis(Function::Start, "start!", 10),
            Event::invoke(0, Function::GetTimestamp, (), 11),
            Event::nemesis(Function::Stop, "stop!", 20),
            Event::ok(0, Function::GetTimestamp, 1, 25),
        ])
        .unwrap();
        assert_eq!(TimestampChecker::new(0).check(&history).unwrap().errors.len(), 2);
        assert!(TimestampChecker::new(5).check(&history).unwrap().valid);
    }

    #[test]
    fn rejects_malformed_ranges() {
        let history = EventHistory::new(vec![
            Event::invoke(0, Function::GetTimestamps, 2, 1),
            Event::ok(0, Function::GetTimestamps, vec![4], 2),
        ])
        .unwrap();
        assert!(matches!(
            TimestampChecker::default().check(&history),
            Err(CheckError::MalformedValue { index: 1, .. })
        ));
    }
}
