use {
    crate::{
        CheckError, CheckResult, Checker, IsolatedProcessChecker, MutualExclusionChecker,
        RefreshChecker, TimestampChecker,
    },
    colorful::Colorful,
    std::{panic, thread},
    timelock_core::{ingest, EventHistory},
    tracing::{debug, info},
};

/// Parameters shared by the preset checker sets.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CheckerConfig {
    liveness_grace: u64,
    lease_duration: Option<u64>,
}

impl CheckerConfig {
    /// How long after a nemesis `stop` an operation may still complete and count as progress
    /// made during the fault. Defaults to zero.
    pub fn liveness_grace(mut self, liveness_grace: u64) -> Self {
        self.liveness_grace = liveness_grace;
        self
    }

    /// Lease length in history time units. Without one, only a release ends a hold.
    pub fn lease_duration(mut self, lease_duration: u64) -> Self {
        self.lease_duration = Some(lease_duration);
        self
    }
}

/// An ordered collection of checkers whose verdicts are merged into one [`CheckResult`].
///
/// Evidence appears in checker registration order regardless of whether the checkers ran
/// sequentially or in parallel.
#[derive(Default)]
pub struct CheckerSet {
    checkers: Vec<Box<dyn Checker>>,
}

impl CheckerSet {
    pub fn new() -> Self {
        CheckerSet::default()
    }

    pub fn checker(mut self, checker: impl Checker + 'static) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }

    /// Checks the timestamp half of the oracle.
    pub fn timestamp(config: &CheckerConfig) -> Self {
        CheckerSet::new().checker(TimestampChecker::new(config.liveness_grace))
    }

    /// Checks the lock half of the oracle.
    pub fn lock(config: &CheckerConfig) -> Self {
        CheckerSet::new()
            .checker(MutualExclusionChecker::new(config.lease_duration))
            .checker(IsolatedProcessChecker)
            .checker(RefreshChecker::new(config.lease_duration))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.checkers.iter().map(|c| c.name())
    }

    /// Runs every checker in turn. The first checker error aborts the run.
    pub fn check(&self, history: &EventHistory) -> Result<CheckResult, CheckError> {
        let results = self.checkers.iter().map(|checker| run(checker.as_ref(), history));
        self.merge(results)
    }

    /// Runs every checker on its own thread.
    pub fn check_parallel(&self, history: &EventHistory) -> Result<CheckResult, CheckError> {
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .checkers
                .iter()
                .map(|checker| scope.spawn(move || run(checker.as_ref(), history)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|err| panic::resume_unwind(err)))
                .collect()
        });
        self.merge(results)
    }

    /// Parses flat JSON trace records and checks the resulting history.
    pub fn check_json(&self, json: &str) -> Result<CheckResult, CheckError> {
        let history = ingest::from_json_str(json)?;
        self.check(&history)
    }

    fn merge(
        &self,
        results: impl IntoIterator<Item = Result<CheckResult, CheckError>>,
    ) -> Result<CheckResult, CheckError> {
        let mut merged = CheckResult::default();
        for result in results {
            merged.merge(result?);
        }
        info!(
            checkers = self.checkers.len(),
            valid = merged.valid,
            errors = merged.errors.len(),
            "History checked."
        );
        if std::env::var("TIMELOCK_DEBUG").is_ok() && !merged.valid {
            println!("Evidence of violations:");
            for (k, e) in merged.errors.iter().enumerate() {
                println!("{}", format!("{k: >3}. {e}").color(colorful::Color::Red));
            }
        }
        Ok(merged)
    }
}

fn run(checker: &dyn Checker, history: &EventHistory) -> Result<CheckResult, CheckError> {
    debug!(checker = checker.name(), events = history.len(), "Checker started.");
    let result = checker.check(history)?;
    debug!(
        checker = checker.name(),
        valid = result.valid,
        errors = result.errors.len(),
        "Checker finished."
    );
    Ok(result)
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::Evidence,
        timelock_core::{Event, Function},
    };

    fn racy_history() -> EventHistory {
        EventHistory::new(vec![
            Event::invoke(0, Function::AcquireLock, "alpha", 1),
            Event::ok(0, Function::AcquireLock, (), 2),
            Event::nemesis(Function::Start, vec![1], 3),
            Event::invoke(1, Function::AcquireLock, "alpha", 4),
            Event::ok(1, Function::AcquireLock, (), 5),
            Event::nemesis(Function::Stop, "stop!", 6),
            Event::invoke(1, Function::RefreshLock, "alpha", 7),
            Event::ok(1, Function::RefreshLock, (), 8),
            Event::invoke(0, Function::RefreshLock, "alpha", 9),
            Event::ok(0, Function::RefreshLock, (), 10),
        ])
        .unwrap()
    }

    #[test]
    fn presets_register_their_checkers() {
        let config = CheckerConfig::default();
        assert_eq!(CheckerSet::timestamp(&config).names().collect::<Vec<_>>(), vec!["timestamp"]);
        assert_eq!(
            CheckerSet::lock(&config).names().collect::<Vec<_>>(),
            vec!["mutual-exclusion", "isolated-process", "refresh"]
        );
    }

    #[test]
    fn parallel_run_matches_sequential_run() {
        let history = racy_history();
        let set = CheckerSet::lock(&CheckerConfig::default());
        let sequential = set.check(&history).unwrap();
        assert_eq!(set.check_parallel(&history).unwrap(), sequential);

        let errors: Vec<_> = sequential.errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            errors,
            vec![
                ":0 ok acquire-lock nil@2 → :1 ok acquire-lock nil@5",
                ":1 ok acquire-lock nil@5",
                ":0 invoke refresh-lock \"alpha\"@9 → :0 ok refresh-lock nil@10",
            ]
        );
    }

    #[test]
    fn checker_errors_abort_the_run() {
        let set = CheckerSet::new()
            .checker(|_: &EventHistory| Ok::<_, CheckError>(CheckResult::default()))
            .checker(|_: &EventHistory| {
                Err::<CheckResult, _>(CheckError::MissingInvocation { index: 3 })
            });
        let history = EventHistory::default();
        assert!(matches!(
            set.check(&history),
            Err(CheckError::MissingInvocation { index: 3 })
        ));
        assert!(matches!(
            set.check_parallel(&history),
            Err(CheckError::MissingInvocation { index: 3 })
        ));
    }

    #[test]
    fn empty_set_accepts_everything() {
        let result = CheckerSet::new().check(&racy_history()).unwrap();
        assert_eq!(result, CheckResult::default());
        let evidence: Vec<Evidence> = result.errors;
        assert!(evidence.is_empty());
    }
}
