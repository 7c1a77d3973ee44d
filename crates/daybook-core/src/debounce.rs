//! Trailing-edge debouncer.
//!
//! A background worker owns the pending value and runs the action once the
//! quiet window passes without a newer call. Actions run on the worker one
//! at a time, so two invocations never overlap.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

enum Command<T> {
    Call(T),
    CallNow(T, oneshot::Sender<()>),
    Flush(oneshot::Sender<()>),
    Cancel,
}

/// Handle to a debounce worker. Dropping the last handle runs any pending
/// value and stops the worker.
pub struct Debouncer<T> {
    commands: mpsc::UnboundedSender<Command<T>>,
    delay: Duration,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            delay: self.delay,
        }
    }
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(receiver, delay, action));
        Self { commands, delay }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace the pending value and restart the quiet window.
    pub fn call(&self, value: T) {
        if self.commands.send(Command::Call(value)).is_err() {
            tracing::debug!("Debounce worker has stopped; dropping call");
        }
    }

    /// Drop any pending value and run `value` right away.
    ///
    /// Resolves once the action has finished.
    pub async fn call_now(&self, value: T) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::CallNow(value, done)).is_ok() {
            let _ = finished.await;
        }
    }

    /// Run the pending value now, if any. Resolves once the worker is idle.
    pub async fn flush(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Flush(done)).is_ok() {
            let _ = finished.await;
        }
    }

    /// Discard the pending value without running it.
    pub fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }
}

async fn run_worker<T, F, Fut>(
    mut receiver: mpsc::UnboundedReceiver<Command<T>>,
    delay: Duration,
    action: F,
) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut pending: Option<(T, Instant)> = None;

    loop {
        let deadline = pending.as_ref().map(|(_, at)| *at);
        let command = if let Some(deadline) = deadline {
            tokio::select! {
                command = receiver.recv() => command,
                () = tokio::time::sleep_until(deadline) => {
                    if let Some((value, _)) = pending.take() {
                        action(value).await;
                    }
                    continue;
                }
            }
        } else {
            receiver.recv().await
        };

        let Some(command) = command else {
            if let Some((value, _)) = pending.take() {
                action(value).await;
            }
            break;
        };

        match command {
            Command::Call(value) => pending = Some((value, Instant::now() + delay)),
            Command::CallNow(value, done) => {
                pending = None;
                action(value).await;
                let _ = done.send(());
            }
            Command::Flush(done) => {
                if let Some((value, _)) = pending.take() {
                    action(value).await;
                }
                let _ = done.send(());
            }
            Command::Cancel => pending = None,
        }
    }
}
