use futures_util::future::BoxFuture;
use std::fmt;
use std::time::Duration;

pub type TimerTask = BoxFuture<'static, ()>;

/// Runs a task once after a delay, unless cancelled first.
pub trait DelayTimer: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Cancels a scheduled task. Dropping the handle without calling
/// [`TimerHandle::cancel`] leaves the task armed.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Timer backed by the tokio clock, so a paused runtime drives it in virtual time.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl DelayTimer for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        let abort = join.abort_handle();
        TimerHandle::new(move || abort.abort())
    }
}
