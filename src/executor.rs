//! Runtime used for asynchronous evaluation, and the handle callers use to obtain the result.
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use tokio::{
    runtime::Runtime,
    sync::{oneshot, Semaphore},
};

use crate::{Error, Result};

/// Configuration for [`AsyncExecutor`].
#[derive(Debug, Clone)]
pub(crate) struct AsyncExecutorConfig {
    /// Runtime worker threads.
    pub core_threads: usize,
    /// Upper bound on evaluations running at the same time.
    pub max_threads: usize,
    /// Evaluations that may wait for a free thread before submissions are rejected.
    pub queue_capacity: usize,
}

/// Runs blocking evaluations on a dedicated tokio runtime.
///
/// At most `max_threads` evaluations run at once and at most `queue_capacity` more wait for a
/// thread. Submissions beyond that are rejected instead of blocking the caller.
///
/// Dropping the executor shuts the runtime down in the background. Evaluations that have not
/// started yet are abandoned.
pub(crate) struct AsyncExecutor {
    // Always `Some` until dropped.
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
}

impl AsyncExecutor {
    pub(crate) fn new(config: AsyncExecutorConfig) -> Result<AsyncExecutor> {
        let max_threads = config.max_threads.max(config.core_threads).max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.core_threads.max(1))
            .max_blocking_threads(max_threads)
            .thread_name("fluxgate-async")
            .build()?;

        Ok(AsyncExecutor {
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(max_threads + config.queue_capacity)),
        })
    }

    /// Run `evaluation` on the runtime's blocking pool. Never blocks waiting for a thread.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerPoolSaturated`] if the running and waiting evaluations are at capacity.
    pub(crate) fn submit(
        &self,
        evaluation: impl FnOnce() -> Result<bool> + Send + 'static,
    ) -> Result<PendingEvaluation> {
        let Some(runtime) = &self.runtime else {
            return Err(Error::EvaluationAbandoned);
        };
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| {
                log::warn!(target: "fluxgate",
                    "rejecting async evaluation: worker pool is saturated");
                Error::WorkerPoolSaturated
            })?;

        let (sender, receiver) = oneshot::channel();
        runtime.spawn_blocking(move || {
            let _permit = permit;
            // The caller may have dropped the handle already.
            let _ = sender.send(evaluation());
        });

        Ok(PendingEvaluation { receiver })
    }
}

impl Drop for AsyncExecutor {
    fn drop(&mut self) {
        // A plain drop blocks, which panics when the last client is dropped inside async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Handle to an evaluation running on the client's runtime.
///
/// Resolves exactly once, either to the evaluation result or to the same error the synchronous
/// evaluation would return. If the evaluation never produced a result (it panicked, or the client
/// was dropped before it started), the handle resolves to [`Error::EvaluationAbandoned`].
///
/// Async callers `.await` the handle. Sync callers use [`PendingEvaluation::wait`]. Dropping the
/// handle does not cancel the evaluation.
///
/// # Examples
/// ```no_run
/// # fn test(client: &fluxgate::Client) -> fluxgate::Result<()> {
/// let pending = client.is_enabled_async("new-checkout", "prod")?;
/// // ... do other work ...
/// let enabled = pending.wait().unwrap_or(false);
/// # Ok(())
/// # }
/// ```
///
/// ```no_run
/// # async fn test(client: &fluxgate::Client) -> fluxgate::Result<()> {
/// let enabled = client.is_enabled_async("new-checkout", "prod")?.await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PendingEvaluation {
    receiver: oneshot::Receiver<Result<bool>>,
}

impl PendingEvaluation {
    /// Block the current thread until the evaluation finishes.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async context. `.await` the handle there instead.
    pub fn wait(self) -> Result<bool> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(Error::EvaluationAbandoned))
    }

    /// Return the result if the evaluation has finished, without blocking. Returns `None` while it
    /// is still running.
    pub fn try_result(&mut self) -> Option<Result<bool>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::EvaluationAbandoned)),
        }
    }
}

impl Future for PendingEvaluation {
    type Output = Result<bool>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::EvaluationAbandoned)))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc, Arc,
        },
        time::{Duration, Instant},
    };

    use super::{AsyncExecutor, AsyncExecutorConfig};
    use crate::Error;

    fn executor(core: usize, max: usize, queue: usize) -> AsyncExecutor {
        AsyncExecutor::new(AsyncExecutorConfig {
            core_threads: core,
            max_threads: max,
            queue_capacity: queue,
        })
        .unwrap()
    }

    #[test]
    fn runs_submitted_evaluations() {
        let executor = executor(2, 4, 10);

        let pending: Vec<_> = (0..5)
            .map(|i| executor.submit(move || Ok(i % 2 == 0)).unwrap())
            .collect();

        let results: Vec<bool> = pending.into_iter().map(|p| p.wait().unwrap()).collect();
        assert_eq!(results, vec![true, false, true, false, true]);
    }

    #[test]
    fn rejects_when_running_and_waiting_evaluations_are_at_capacity() {
        let executor = executor(1, 1, 1);
        let (release, gate) = mpsc::channel::<()>();
        let gate = Arc::new(std::sync::Mutex::new(gate));

        let blocked: Vec<_> = (0..2)
            .map(|_| {
                let gate = Arc::clone(&gate);
                executor
                    .submit(move || {
                        let _ = gate.lock().unwrap().recv();
                        Ok(true)
                    })
                    .unwrap()
            })
            .collect();

        assert!(matches!(
            executor.submit(|| Ok(true)),
            Err(Error::WorkerPoolSaturated)
        ));

        drop(release);
        for pending in blocked {
            assert!(pending.wait().unwrap());
        }
        // Capacity is returned once evaluations finish.
        assert!(executor.submit(|| Ok(false)).unwrap().wait().is_ok());
    }

    #[test]
    fn panicking_evaluation_is_abandoned() {
        let executor = executor(1, 1, 10);

        let pending = executor
            .submit(|| -> crate::Result<bool> { panic!("evaluation exploded") })
            .unwrap();

        assert!(matches!(pending.wait(), Err(Error::EvaluationAbandoned)));
        assert!(executor.submit(|| Ok(true)).unwrap().wait().unwrap());
    }

    #[test]
    fn try_result_does_not_block() {
        let executor = executor(1, 1, 1);
        let (release, gate) = mpsc::channel::<()>();

        let mut pending = executor
            .submit(move || {
                let _ = gate.recv();
                Ok(true)
            })
            .unwrap();
        assert!(pending.try_result().is_none());

        release.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = loop {
            if let Some(result) = pending.try_result() {
                break result;
            }
            assert!(Instant::now() < deadline, "evaluation did not finish");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert!(result.unwrap());
    }

    #[test]
    fn evaluations_do_not_run_beyond_max_threads() {
        let executor = executor(1, 2, 10);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let pending: Vec<_> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                executor
                    .submit(move || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(10));
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(true)
                    })
                    .unwrap()
            })
            .collect();

        for pending in pending {
            assert!(pending.wait().unwrap());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn handle_can_be_awaited() {
        let executor = executor(1, 2, 2);

        let enabled = executor.submit(|| Ok(true)).unwrap().await.unwrap();

        assert!(enabled);
    }
}
