//! Local fan-out executor: "map a function over inputs, then wait for all".
//!
//! Every input becomes its own tokio task; a semaphore bounds how many run at
//! once. A task that panics is reported as [`TaskOutcome::Crashed`] and never
//! takes its siblings down.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// A spawned task together with the input it was spawned for.
pub struct TaskHandle<T> {
    input: String,
    handle: JoinHandle<T>,
}

/// How a task settled.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Finished { input: String, output: T },
    Crashed { input: String, message: String },
}

impl<T> TaskOutcome<T> {
    pub fn input(&self) -> &str {
        match self {
            Self::Finished { input, .. } | Self::Crashed { input, .. } => input,
        }
    }
}

/// Bounded-concurrency executor on the current tokio runtime.
#[derive(Clone)]
pub struct LocalExecutor {
    semaphore: Arc<Semaphore>,
}

impl LocalExecutor {
    pub fn new(concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Spawn `f` once per input. Tasks start immediately, gated by the semaphore.
    pub fn map<T, F, Fut>(&self, inputs: &[String], f: F) -> Vec<TaskHandle<T>>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        inputs
            .iter()
            .map(|input| {
                let sem = self.semaphore.clone();
                let f = f.clone();
                let owned = input.clone();
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed, so the permit is always granted.
                    let _permit = sem.acquire_owned().await;
                    (f.as_ref())(owned).await
                });
                TaskHandle {
                    input: input.clone(),
                    handle,
                }
            })
            .collect()
    }

    /// Wait for every handle to settle, in input order.
    ///
    /// `on_settled` is called with the running count as each outcome is collected.
    pub async fn wait_all<T>(
        handles: Vec<TaskHandle<T>>,
        mut on_settled: impl FnMut(usize, &TaskOutcome<T>),
    ) -> Vec<TaskOutcome<T>> {
        let mut outcomes = Vec::with_capacity(handles.len());
        for (i, TaskHandle { input, handle }) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(output) => TaskOutcome::Finished { input, output },
                Err(e) if e.is_panic() => TaskOutcome::Crashed {
                    input,
                    message: panic_message(e.into_panic()),
                },
                Err(e) => TaskOutcome::Crashed {
                    input,
                    message: e.to_string(),
                },
            };
            on_settled(i + 1, &outcome);
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
