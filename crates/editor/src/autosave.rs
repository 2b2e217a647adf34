// Debounced autosave.
//
// Every dirty-marking edit pushes the deadline back by the quiet period
// (default 2.5s, range 250ms–60s). When the deadline passes with no further
// edits, the session is flushed silently. One task per open editor.

use std::sync::Arc;
use std::time::Duration;

use griddoc_store::Store;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::flush::{flush, FlushMode, FlushOutcome, Notice};
use crate::session::EditorSession;

/// Default quiet period before an autosave.
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 2_500;
const MIN_QUIET_PERIOD_MS: u64 = 250;
const MAX_QUIET_PERIOD_MS: u64 = 60_000;

/// Quiet period for `ms`, clamped to [250, 60000].
pub fn clamp_quiet_period(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_QUIET_PERIOD_MS, MAX_QUIET_PERIOD_MS))
}

/// A single restartable deadline.
#[derive(Debug, Clone)]
pub struct QuietPeriod {
    window: Duration,
    deadline: Option<Instant>,
}

impl QuietPeriod {
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Restart the timer from now.
    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    /// Like `touch` but with a specific timestamp (for testing).
    fn touch_at(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_due(&self) -> bool {
        self.is_due_at(Instant::now())
    }

    fn is_due_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Spawn the autosave loop for one session.
///
/// Stops when `shutdown` flips to true (or its sender is dropped) or when
/// the edit channel closes. A pending deadline is dropped on stop; a flush
/// already in progress runs to completion first.
pub(crate) fn spawn<S: Store>(
    store: Arc<S>,
    session: Arc<Mutex<EditorSession>>,
    notices: broadcast::Sender<Notice>,
    window: Duration,
    mut edits: mpsc::UnboundedReceiver<()>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = QuietPeriod::new(window);
        loop {
            let deadline = timer.deadline();
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        if timer.is_armed() {
                            debug!("autosave stopped with a pending deadline");
                        }
                        break;
                    }
                }
                edit = edits.recv() => match edit {
                    Some(()) => timer.touch(),
                    None => break,
                },
                () = wait_until(deadline) => {
                    timer.cancel();
                    debug!(window_ms = window.as_millis() as u64, "quiet period elapsed");
                    if flush(&*store, &session, FlushMode::Silent, &notices).await
                        == FlushOutcome::Skipped
                    {
                        // A save is in flight; try again after another quiet period.
                        timer.touch();
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_period_is_clamped() {
        assert_eq!(clamp_quiet_period(0), Duration::from_millis(250));
        assert_eq!(clamp_quiet_period(2_500), Duration::from_millis(2_500));
        assert_eq!(clamp_quiet_period(u64::MAX), Duration::from_secs(60));
    }

    #[test]
    fn idle_timer_is_never_due() {
        let timer = QuietPeriod::new(Duration::from_millis(2_500));
        assert!(!timer.is_armed());
        assert!(!timer.is_due_at(Instant::now() + Duration::from_secs(3600)));
    }

    #[test]
    fn each_touch_restarts_the_window() {
        let mut timer = QuietPeriod::new(Duration::from_millis(2_500));
        let start = Instant::now();

        timer.touch_at(start);
        timer.touch_at(start + Duration::from_secs(1));
        timer.touch_at(start + Duration::from_secs(2));

        assert!(!timer.is_due_at(start + Duration::from_millis(4_400)));
        assert!(timer.is_due_at(start + Duration::from_millis(4_500)));
        assert_eq!(timer.deadline(), Some(start + Duration::from_millis(4_500)));
    }

    #[test]
    fn cancel_disarms() {
        let mut timer = QuietPeriod::new(Duration::from_millis(250));
        let start = Instant::now();
        timer.touch_at(start);
        timer.cancel();
        assert!(!timer.is_due_at(start + Duration::from_secs(1)));
        assert_eq!(timer.deadline(), None);
    }
}
