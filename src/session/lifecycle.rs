//! Pieces shared by the feed and trade session supervisors.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::ReconnectConfig;
use crate::models::{LogoutInfo, LogoutReason};
use crate::{Error, Result};

/// Where a wrapper is in its login cycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LogonState {
    /// Not started, or stopped
    #[default]
    Stopped,
    /// A connect attempt is in progress
    Connecting,
    /// Every bootstrap step completed
    LoggedOn,
    /// The last attempt ended
    LoggedOut(LogoutInfo),
}

/// Broadcasts [`LogonState`] to `wait_for_logon` callers.
#[derive(Debug)]
pub(crate) struct LogonSignal {
    tx: watch::Sender<LogonState>,
}

impl LogonSignal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(LogonState::Stopped);
        Self { tx }
    }

    pub(crate) fn set(&self, state: LogonState) {
        self.tx.send_replace(state);
    }

    pub(crate) fn current(&self) -> LogonState {
        self.tx.borrow().clone()
    }

    /// Wait until the current attempt either logs on or ends.
    pub(crate) async fn wait(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.tx.subscribe();
        let state = tokio::time::timeout(timeout, async {
            rx.wait_for(|state| !matches!(state, LogonState::Connecting))
                .await
                .map(|state| (*state).clone())
                .map_err(|_| Error::ChannelError)
        })
        .await??;

        match state {
            LogonState::LoggedOn => Ok(()),
            LogonState::LoggedOut(info) => Err(info.into_error()),
            LogonState::Stopped | LogonState::Connecting => Err(Error::NotLoggedOn),
        }
    }
}

/// Reports the end of a connect attempt to its supervisor.
///
/// The first report wins; reports for an attempt that already ended go
/// nowhere because the supervisor dropped the receiver.
pub(crate) type EndSender = mpsc::UnboundedSender<LogoutInfo>;
pub(crate) type EndReceiver = mpsc::UnboundedReceiver<LogoutInfo>;

pub(crate) fn end_channel() -> (EndSender, EndReceiver) {
    mpsc::unbounded_channel()
}

/// How a connect attempt finished.
#[derive(Debug)]
pub(crate) enum Outcome {
    Ended(LogoutInfo),
    Stopped,
}

/// Wait for the attempt to end or for a stop request, whichever comes first.
pub(crate) async fn next_outcome(
    end_rx: &mut EndReceiver,
    stop_rx: &mut watch::Receiver<bool>,
) -> Outcome {
    tokio::select! {
        info = end_rx.recv() => Outcome::Ended(
            info.unwrap_or_else(|| LogoutInfo::new(LogoutReason::Unknown, "session ended")),
        ),
        _ = stop_rx.wait_for(|stop| *stop) => Outcome::Stopped,
    }
}

/// Sleep for `delay`; returns `true` if a stop was requested meanwhile.
pub(crate) async fn stopped_during(delay: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = stop_rx.wait_for(|stop| *stop) => true,
    }
}

/// Run a remote request under `timeout`.
pub(crate) async fn request<T, F>(timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, future).await?
}

/// Handle on a running supervisor task.
#[derive(Debug)]
pub(crate) struct Control {
    stop: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
}

impl Control {
    pub(crate) fn spawn<F, Fut>(supervise: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, stop_rx) = watch::channel(false);
        let supervisor = tokio::spawn(supervise(stop_rx));
        Self { stop, supervisor }
    }

    /// Ask the supervisor to log out and wait for it to finish.
    pub(crate) async fn stop(self) {
        self.stop.send_replace(true);
        if let Err(e) = self.supervisor.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Supervisor task ended abnormally");
            }
        }
    }

    pub(crate) fn abort(self) {
        self.supervisor.abort();
    }
}

/// Tasks belonging to one connect attempt.
#[derive(Debug, Default)]
pub(crate) struct TaskSet {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSet {
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(tokio::spawn(future));
    }

    pub(crate) fn abort_all(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }
}

/// Map a failed request onto the logout reported for the attempt.
pub(crate) fn logout_from_error(error: &Error, fallback: LogoutReason) -> LogoutInfo {
    match error {
        Error::Logout { reason, text } => LogoutInfo::new(*reason, text.clone()),
        Error::Authentication(text) => LogoutInfo::new(LogoutReason::InvalidCredentials, text.clone()),
        Error::Connection(text) => LogoutInfo::new(LogoutReason::ConnectError, text.clone()),
        Error::Timeout => LogoutInfo::new(LogoutReason::LoginTimeout, error.to_string()),
        other => LogoutInfo::new(fallback, other.to_string()),
    }
}

/// Returns `true` if the supervisor should try again after `info`.
pub(crate) fn should_reconnect(config: &ReconnectConfig, info: &LogoutInfo, attempts: u32) -> bool {
    info.reason.is_retryable() && config.should_retry(attempts)
}
