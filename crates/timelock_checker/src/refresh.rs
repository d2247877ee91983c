use {
    crate::{locks, CheckError, CheckResult, Checker, Evidence},
    std::collections::BTreeMap,
    timelock_core::{EventHistory, EventType, Function, Process},
};

/// Checks that a `refresh-lock` only succeeds for the current holder of a live lease.
///
/// Holder state is snapshotted when the refresh is invoked. The refresh must not succeed if, at
/// that point, the process did not hold the lock or its lease had certainly expired: more than
/// the lease duration had passed since the holder's last successful acquire or refresh completed.
/// A process stops holding the lock when its release completes `ok` or another process acquires
/// it. A release that fails leaves the lease in place.
#[derive(Clone, Copy, Debug, Default)]
pub struct RefreshChecker {
    lease_duration: Option<u64>,
}

impl RefreshChecker {
    pub fn new(lease_duration: Option<u64>) -> Self {
        RefreshChecker { lease_duration }
    }
}

impl Checker for RefreshChecker {
    fn name(&self) -> &str {
        "refresh"
    }

    fn check(&self, history: &EventHistory) -> Result<CheckResult, CheckError> {
        let mut errors = Vec::new();
        for (_, events) in locks::by_lock(history, self.name())? {
            // Holder and the completion time of its last successful acquire or refresh.
            let mut holder: Option<(Process, u64)> = None;
            // Whether each process's outstanding refresh was legitimate when invoked.
            let mut pending: BTreeMap<Process, bool> = BTreeMap::new();
            for locks::LockEvent { event, invoke } in events {
                let process = event.process;
                let held = holder.filter(|(p, _)| *p == process);
                match (event.function, event.kind) {
                    (Function::AcquireLock, EventType::Ok) => holder = Some((process, event.time)),
                    (Function::ReleaseLock, EventType::Ok) if held.is_some() => holder = None,
                    (Function::RefreshLock, EventType::Invoke) => {
                        let legitimate = held.map_or(false, |(_, renewed)| {
                            self.lease_duration
                                .map_or(true, |lease| event.time <= renewed.saturating_add(lease))
                        });
                        pending.insert(process, legitimate);
                    }
                    (Function::RefreshLock, EventType::Ok) => {
                        if pending.remove(&process) == Some(true) {
                            if held.is_some() {
                                holder = Some((process, event.time));
                            }
                        } else {
                            errors.push(Evidence::Pair(invoke.clone(), event.clone()));
                        }
                    }
                    (Function::RefreshLock, EventType::Fail) => {
                        pending.remove(&process);
                    }
                    _ => {}
                }
            }
        }
        Ok(CheckResult::from_errors(errors))
    }
}
