use {
    crate::{locks, CheckError, CheckResult, Checker, Evidence},
    std::collections::BTreeMap,
    timelock_core::{Event, EventHistory, EventType, Function, Process},
    tracing::debug,
};

/// Checks that no two processes hold the same lock at once.
///
/// A hold starts when an `acquire-lock` succeeds. It ends when the holder's `release-lock`
/// completes `ok`, or once the configured lease duration has passed since the holder last invoked
/// a successful acquire or refresh.
///
/// While a release is in flight the lock may already be free, so another process acquiring it
/// is only reported if that release then fails. A release that never completes counts as having
/// taken effect.
#[derive(Clone, Copy, Debug, Default)]
pub struct MutualExclusionChecker {
    lease_duration: Option<u64>,
}

struct Hold<'a> {
    holder: Process,
    acquired: &'a Event,
    renewed_at: u64,
}

impl Hold<'_> {
    fn live_at(&self, time: u64, lease_duration: Option<u64>) -> bool {
        lease_duration.map_or(true, |lease| time <= self.renewed_at.saturating_add(lease))
    }
}

impl MutualExclusionChecker {
    pub fn new(lease_duration: Option<u64>) -> Self {
        MutualExclusionChecker { lease_duration }
    }
}

impl Checker for MutualExclusionChecker {
    fn name(&self) -> &str {
        "mutual-exclusion"
    }

    fn check(&self, history: &EventHistory) -> Result<CheckResult, CheckError> {
        let mut errors = Vec::new();
        for (lock, events) in locks::by_lock(history, self.name())? {
            let mut hold: Option<Hold<'_>> = None;
            // Holders with a release in flight, and the double grants that stand if it fails.
            let mut releasing: BTreeMap<Process, Vec<Evidence>> = BTreeMap::new();
            for locks::LockEvent { event, invoke } in events {
                let by_holder = hold.as_ref().map_or(false, |h| h.holder == event.process);
                match (event.function, event.kind) {
                    (Function::ReleaseLock, EventType::Invoke) if by_holder => {
                        releasing.insert(event.process, Vec::new());
                    }
                    (Function::ReleaseLock, EventType::Ok) => {
                        releasing.remove(&event.process);
                        if by_holder {
                            hold = None;
                        }
                    }
                    (Function::ReleaseLock, EventType::Fail) => {
                        if let Some(granted) = releasing.remove(&event.process) {
                            if !granted.is_empty() {
                                debug!(lock, holder = %event.process, "Lock granted during a failed release.");
                            }
                            errors.extend(granted);
                        }
                    }
                    (Function::RefreshLock, EventType::Ok) if by_holder => {
                        if let Some(h) = hold.as_mut() {
                            h.renewed_at = invoke.time;
                        }
                    }
                    (Function::AcquireLock, EventType::Ok) => {
                        if let Some(h) = &hold {
                            if !by_holder && h.live_at(event.time, self.lease_duration) {
                                let evidence = Evidence::Pair(h.acquired.clone(), event.clone());
                                match releasing.get_mut(&h.holder) {
                                    Some(granted) => granted.push(evidence),
                                    None => {
                                        debug!(lock, holder = %h.holder, process = %event.process, "Lock granted twice.");
                                        errors.push(evidence);
                                    }
                                }
                            }
                        }
                        hold = Some(Hold {
                            holder: event.process,
                            acquired: event,
                            renewed_at: invoke.time,
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(CheckResult::from_errors(errors))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn errors(checker: MutualExclusionChecker, events: Vec<Event>) -> Vec<String> {
        let history = EventHistory::new(events).unwrap();
        checker
            .check(&history)
            .unwrap()
            .errors
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn handing_a_lock_over_is_fine() {
        let errors = errors(
            MutualExclusionChecker::default(),
            vec![
                Event::invoke(0, Function::AcquireLock, "alpha", 1),
                Event::ok(0, Function::AcquireLock, (), 2),
                Event::invoke(1, Function::AcquireLock, "alpha", 3),
                Event::fail(1, Function::AcquireLock, (), 4),
                Event::invoke(0, Function::ReleaseLock, "alpha", 5),
                Event::ok(0, Function::ReleaseLock, (), 6),
                Event::invoke(1, Function::AcquireLock, "alpha", 7),
                Event::ok(1, Function::AcquireLock, (), 8),
                Event::invoke(0, Function::AcquireLock, "beta", 9),
                Event::ok(0, Function::AcquireLock, (), 10),
            ],
        );
        assert_eq!(errors, Vec::<String>::new());
    }

    #[test]
    fn reports_a_second_holder() {
        let errors = errors(
            MutualExclusionChecker::default(),
            vec![
                Event::invoke(0, Function::AcquireLock, "alpha", 1),
                Event::ok(0, Function::AcquireLock, (), 2),
                Event::invoke(1, Function::AcquireLock, "alpha", 3),
                Event::ok(1, Function::AcquireLock, (), 4),
            ],
        );
        assert_eq!(
            errors,
            vec![":0 ok acquire-lock nil@2 → :1 ok acquire-lock nil@4"]
        );
    }

    #[test]
    fn expired_and_refreshed_leases() {
        let events = vec![
            Event::invoke(0, Function::AcquireLock, "alpha", 0),
            Event::ok(0, Function::AcquireLock, (), 1),
            Event::invoke(0, Function::RefreshLock, "alpha", 8),
            Event::ok(0, Function::RefreshLock, (), 9),
            Event::invoke(1, Function::AcquireLock, "alpha", 15),
            Event::ok(1, Function::AcquireLock, (), 16),
            Event::invoke(2, Function::AcquireLock, "alpha", 40),
            Event::ok(2, Function::AcquireLock, (), 41),
        ];
        // The refresh at 8 keeps process 0's lease alive until 18.
        assert_eq!(
            errors(MutualExclusionChecker::new(Some(10)), events.clone()),
            vec![":0 ok acquire-lock nil@1 → :1 ok acquire-lock nil@16"]
        );
        assert_eq!(
            errors(MutualExclusionChecker::new(None), events).len(),
            2
        );
    }

    #[test]
    fn failed_release_keeps_the_hold() {
        let errors = errors(
            MutualExclusionChecker::default(),
            vec![
                Event::invoke(0, Function::AcquireLock, "alpha", 1),
                Event::ok(0, Function::AcquireLock, (), 2),
                Event::invoke(0, Function::ReleaseLock, "alpha", 3),
                Event::fail(0, Function::ReleaseLock, (), 4),
                Event::invoke(1, Function::AcquireLock, "alpha", 5),
                Event::ok(1, Function::AcquireLock, (), 6),
            ],
        );
        assert_eq!(
            errors,
            vec![":0 ok acquire-lock nil@2 → :1 ok acquire-lock nil@6"]
        );
    }

    #[test]
    fn acquire_during_a_release_depends_on_its_outcome() {
        let events = |outcome: EventType| {
            vec![
                Event::invoke(0, Function::AcquireLock, "alpha", 1),
                Event::ok(0, Function::AcquireLock, (), 2),
                Event::invoke(0, Function::ReleaseLock, "alpha", 3),
                Event::invoke(1, Function::AcquireLock, "alpha", 4),
                Event::ok(1, Function::AcquireLock, (), 5),
                Event::new(0_u64, outcome, Function::ReleaseLock, (), 6),
            ]
        };
        assert_eq!(
            errors(MutualExclusionChecker::default(), events(EventType::Ok)),
            Vec::<String>::new()
        );
        assert_eq!(
            errors(MutualExclusionChecker::default(), events(EventType::Fail)),
            vec![":0 ok acquire-lock nil@2 → :1 ok acquire-lock nil@5"]
        );
    }

    #[test]
    fn failed_refresh_by_the_holder_keeps_the_hold() {
        let errors = errors(
            MutualExclusionChecker::default(),
            vec![
                Event::invoke(0, Function::AcquireLock, "alpha", 1),
                Event::ok(0, Function::AcquireLock, (), 2),
                Event::invoke(0, Function::RefreshLock, "alpha", 3),
                Event::fail(0, Function::RefreshLock, (), 4),
                Event::invoke(1, Function::AcquireLock, "alpha", 5),
                Event::ok(1, Function::AcquireLock, (), 6),
            ],
        );
        assert_eq!(
            errors,
            vec![":0 ok acquire-lock nil@2 → :1 ok acquire-lock nil@6"]
        );
    }
}
