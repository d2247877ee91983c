use {
    std::{fmt::Display, future::Future, time::Duration},
    thiserror::Error,
    tokio::time::Instant,
    tracing::{error, info},
};

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MaintenanceError {
    #[error("{failed} of {total} member task(s) failed")]
    MemberFailed { failed: usize, total: usize },
    #[error("member tasks did not finish within {0:?}")]
    Timeout(Duration),
}

/// Fans one maintenance task out to every cluster member under a single collective timeout.
///
/// A batch only succeeds if every member finishes successfully in time. Work already done by
/// members that finished is never rolled back. Tasks still running when the timeout fires are
/// left to finish on their own but the batch is reported as failed.
#[derive(Clone, Copy, Debug)]
pub struct ClusterTaskRunner {
    timeout: Duration,
}

impl ClusterTaskRunner {
    pub fn new(timeout: Duration) -> Self {
        ClusterTaskRunner { timeout }
    }

    pub async fn run<M, F, Fut, T, E>(
        &self,
        members: impl IntoIterator<Item = M>,
        task: F,
    ) -> Result<(), MaintenanceError>
    where
        F: Fn(M) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.run_within(self.timeout, members, task).await
    }

    /// Runs each phase across all members in turn, sharing one deadline between phases. A
    /// later phase never starts when an earlier one failed or the budget is spent.
    pub async fn run_phases<P, M, F, Fut, T, E>(
        &self,
        phases: impl IntoIterator<Item = P>,
        members: &[M],
        task: F,
    ) -> Result<(), MaintenanceError>
    where
        P: Clone + Display,
        M: Clone,
        F: Fn(P, M) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        for phase in phases {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                error!(%phase, timeout = ?self.timeout, "No time left to start phase.");
                return Err(MaintenanceError::Timeout(self.timeout));
            }
            self.run_within(remaining, members.iter().cloned(), |member| {
                task(phase.clone(), member)
            })
            .await?;
            info!(%phase, "All phase tasks are completed.");
        }
        Ok(())
    }

    async fn run_within<M, F, Fut, T, E>(
        &self,
        timeout: Duration,
        members: impl IntoIterator<Item = M>,
        task: F,
    ) -> Result<(), MaintenanceError>
    where
        F: Fn(M) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let started = Instant::now();
        let handles: Vec<_> = members
            .into_iter()
            .map(|member| tokio::spawn(task(member)))
            .collect();
        let total = handles.len();

        // Dropping the join handles on timeout detaches the tasks rather than aborting them.
        let results = match tokio::time::timeout(timeout, futures::future::join_all(handles)).await
        {
            Ok(results) => results,
            Err(_) => {
                error!(total, ?timeout, "Member tasks timed out.");
                return Err(MaintenanceError::Timeout(timeout));
            }
        };

        let mut failed = 0;
        for (member, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    error!(member, %err, "Member task failed.");
                    failed += 1;
                }
                Err(err) => {
                    error!(member, %err, "Member task panicked or was cancelled.");
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            return Err(MaintenanceError::MemberFailed { failed, total });
        }
        info!(total, elapsed = ?started.elapsed(), "All member tasks completed.");
        Ok(())
    }
}
