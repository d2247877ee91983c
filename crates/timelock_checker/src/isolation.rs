use {
    crate::{CheckError, CheckResult, Checker, Evidence},
    timelock_core::EventHistory,
    tracing::debug,
};

/// Checks that processes the nemesis cut off from quorum make no progress while cut off.
///
/// An operation by an isolated process that was invoked after the episode's `start` and
/// succeeded before its `stop` (or at any point, if the episode never stopped) is reported.
///
/// Operations invoked at or before the `start` are not attributed to the fault even if they
/// complete while it lasts: the oracle may have committed them before the process was cut off.
#[derive(Clone, Copy, Debug, Default)]
pub struct IsolatedProcessChecker;

impl Checker for IsolatedProcessChecker {
    fn name(&self) -> &str {
        "isolated-process"
    }

    fn check(&self, history: &EventHistory) -> Result<CheckResult, CheckError> {
        let mut errors = Vec::new();
        for episode in history.nemesis_episodes() {
            let isolated = episode.isolated();
            if isolated.is_empty() {
                continue;
            }
            debug!(start = episode.start.time, ?isolated, "Checking isolated processes.");
            for op in history.operations() {
                if !isolated.contains(&op.process()) || op.invoke.time <= episode.start.time {
                    continue;
                }
                let Some(ok) = op.ok() else { continue };
                if episode.stop.map_or(true, |stop| ok.time < stop.time) {
                    errors.push(Evidence::Event(ok.clone()));
                }
            }
        }
        Ok(CheckResult::from_errors(errors))
    }
}
