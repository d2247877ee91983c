use {
    crate::CheckError,
    std::collections::BTreeMap,
    timelock_core::{Event, EventHistory, EventType},
};

/// A lock operation event together with the invocation it belongs to.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LockEvent<'a> {
    pub(crate) event: &'a Event,
    pub(crate) invoke: &'a Event,
}

/// Groups every lock operation event by the lock id its invocation names, keeping history
/// order within each lock. Unfinished `info` completions are skipped.
pub(crate) fn by_lock<'a>(
    history: &'a EventHistory,
    checker: &str,
) -> Result<BTreeMap<&'a str, Vec<LockEvent<'a>>>, CheckError> {
    let mut locks: BTreeMap<&str, Vec<LockEvent<'_>>> = BTreeMap::new();
    for (index, event) in history.iter() {
        if !event.function.is_lock_op() || event.kind == EventType::Info {
            continue;
        }
        let invoke_index = match event.kind {
            EventType::Invoke => index,
            _ => history
                .invocation_of(index)
                .ok_or(CheckError::MissingInvocation { index })?,
        };
        let invoke = &history.events()[invoke_index];
        let lock = invoke
            .value
            .as_text()
            .ok_or_else(|| CheckError::MalformedValue {
                checker: checker.to_string(),
                index: invoke_index,
                value: invoke.value.clone(),
            })?;
        locks
            .entry(lock)
            .or_default()
            .push(LockEvent { event, invoke });
    }
    Ok(locks)
}
