//! Connect, login and reconnect supervision shared by the session wrappers.
//!
//! A wrapper describes its two connections with [`SessionLinks`]: how to
//! connect them and spawn their callback readers, which bootstrap work
//! follows a link login, and what a reload fetches. [`SessionCore`] runs
//! everything else: connect attempts with backoff, the joint login, the
//! two-factor exchange, the bootstrap join, reloads and shutdown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use super::dispatch::{Dispatcher, SubscriptionId};
use super::flags::{InitFlags, LoginTracker};
use super::lifecycle::{
    end_channel, logout_from_error, next_outcome, request, should_reconnect, stopped_during,
    Control, EndSender, LogonSignal, LogonState, Outcome, TaskSet,
};
use super::two_factor::{Link, TwoFactorCoordinator};
use crate::config::ConnectionSettings;
use crate::models::{
    Credentials, LoginOutcome, LogoutInfo, LogoutReason, Notification, NotificationSeverity,
    NotificationType, TwoFactorAuth,
};
use crate::{Error, Result};

const CLIENT_LOGOUT: &str = "Client logout";

/// Events every session publishes besides its own data events.
pub(crate) trait SessionEvent: fmt::Debug + Send + Sync + 'static {
    /// Every bootstrap step completed.
    fn logon() -> Self;

    /// The connect attempt ended.
    fn logout(info: LogoutInfo) -> Self;

    /// Two-factor challenge, result or error.
    fn two_factor(auth: TwoFactorAuth) -> Self;

    /// A reload completed.
    fn config_changed() -> Self;

    /// Server or session notification.
    fn notification(notification: Notification) -> Self;

    /// Short name used in logs.
    fn event_name(&self) -> &'static str;
}

/// The two protocol connections of a session.
#[async_trait]
pub(crate) trait SessionLinks: Send + Sync + Sized + 'static {
    /// Event delivered to handlers.
    type Event: SessionEvent;

    /// State kept current from loads and callbacks.
    type Cache: Default + Send + Sync + 'static;

    /// Session name in logs.
    const NAME: &'static str;

    /// Steps that must complete before the session is logged on.
    const REQUIRED: InitFlags;

    /// Steps a reload refreshes.
    const RELOAD_REQUIRED: InitFlags;

    /// Step completed by the login of `link`.
    fn login_flag(link: Link) -> InitFlags;

    /// Connect both links and spawn their callback readers.
    ///
    /// Readers report the end of a connection on `end`.
    async fn connect(session: &Arc<SessionCore<Self>>, generation: u64, end: &EndSender) -> Result<()>;

    async fn login(&self, link: Link, credentials: &Credentials) -> Result<LoginOutcome>;

    async fn two_factor_response(&self, link: Link, one_time_password: &str) -> Result<DateTime<Utc>>;

    async fn two_factor_resume(&self, link: Link) -> Result<DateTime<Utc>>;

    async fn logout(&self, link: Link, message: &str) -> Result<LogoutInfo>;

    async fn disconnect(&self, link: Link, text: &str);

    /// `link` logged in; spawn the bootstrap work that depends on it.
    fn on_link_login(session: &Arc<SessionCore<Self>>, link: Link, generation: u64, end: EndSender);

    /// The session logged on.
    fn on_logon(_session: &Arc<SessionCore<Self>>, _generation: u64) {}

    /// Spawn a reload round after a configuration change.
    fn reload(session: &Arc<SessionCore<Self>>, generation: u64, reload: u64);

    /// Runs on a client stop before both links log out.
    async fn before_logout(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

/// Result of completing one bootstrap or reload step.
pub(crate) enum Step {
    Pending,
    LoggedOn,
    Reloaded,
}

pub(crate) struct SessionState<C> {
    pub(crate) generation: u64,
    pub(crate) tracker: LoginTracker,
    pub(crate) two_factor: TwoFactorCoordinator,
    pub(crate) cache: C,
    end: Option<EndSender>,
}

/// Supervisor of one session pair.
pub(crate) struct SessionCore<L: SessionLinks> {
    pub(crate) settings: ConnectionSettings,
    pub(crate) links: L,
    pub(crate) state: RwLock<SessionState<L::Cache>>,
    pub(crate) tasks: TaskSet,
    dispatcher: Dispatcher<L::Event>,
    logon: LogonSignal,
    control: Mutex<Option<Control>>,
}

/// Login results of one round, gathered under the state lock.
struct LoginRound {
    events: Vec<TwoFactorAuth>,
    logged_in: Vec<Link>,
    logged_on: bool,
    end: Option<EndSender>,
}

impl<L: SessionLinks> SessionCore<L> {
    pub(crate) fn new(settings: ConnectionSettings, links: L) -> Self {
        let dispatcher = Dispatcher::new(L::NAME, settings.event_queue_size, settings.log_events);
        Self {
            settings,
            links,
            state: RwLock::new(SessionState {
                generation: 0,
                tracker: LoginTracker::new(L::REQUIRED, L::RELOAD_REQUIRED),
                two_factor: TwoFactorCoordinator::new(),
                cache: L::Cache::default(),
                end: None,
            }),
            tasks: TaskSet::default(),
            dispatcher,
            logon: LogonSignal::new(),
            control: Mutex::new(None),
        }
    }

    pub(crate) fn start(self: &Arc<Self>) -> Result<()> {
        self.settings.validate()?;

        let mut control = self.control.lock();
        if control.is_some() {
            return Err(Error::AlreadyStarted);
        }

        self.dispatcher.start();
        self.logon.set(LogonState::Connecting);
        let session = self.clone();
        *control = Some(Control::spawn(move |stop_rx| session.supervise(stop_rx)));

        info!(
            session = L::NAME,
            address = %self.settings.address,
            username = %self.settings.username,
            "Session started"
        );
        Ok(())
    }

    pub(crate) async fn stop(&self) {
        let control = self.control.lock().take();
        let Some(control) = control else {
            return;
        };

        control.stop().await;
        self.tasks.abort_all();
        self.dispatcher.shutdown().await;
        self.logon.set(LogonState::Stopped);
    }

    /// Tear down without logging out; used when the wrapper is dropped.
    pub(crate) fn abort(&self) {
        if let Some(control) = self.control.lock().take() {
            control.abort();
            self.tasks.abort_all();
            self.dispatcher.close();
        }
    }

    pub(crate) fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&L::Event) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(handler)
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    pub(crate) fn logon_state(&self) -> LogonState {
        self.logon.current()
    }

    pub(crate) fn is_logged_on(&self) -> bool {
        self.logon.current() == LogonState::LoggedOn
    }

    pub(crate) fn ensure_logged_on(&self) -> Result<()> {
        if self.is_logged_on() {
            Ok(())
        } else {
            Err(Error::NotLoggedOn)
        }
    }

    pub(crate) async fn wait_for_logon(&self, timeout: Duration) -> Result<()> {
        self.logon.wait(timeout).await
    }

    pub(crate) async fn publish(&self, event: L::Event) {
        let name = event.event_name();
        if let Err(e) = self.dispatcher.publish(event).await {
            debug!(session = L::NAME, event = name, error = %e, "Event dropped");
        }
    }

    // Two-factor

    pub(crate) async fn two_factor_response(
        self: &Arc<Self>,
        one_time_password: &str,
        timeout: Duration,
    ) -> Result<()> {
        let (links, generation) = {
            let mut state = self.state.write().await;
            let links = state.two_factor.awaiting();
            if links.is_empty() {
                return Err(Error::InvalidInput(
                    "no two-factor challenge is pending".to_string(),
                ));
            }
            state.two_factor.begin_response();
            (links, state.generation)
        };

        let answers = join_all(links.into_iter().map(|link| async move {
            let result = request(timeout, self.links.two_factor_response(link, one_time_password)).await;
            (link, result)
        }))
        .await;

        let mut first_error = None;
        let round = {
            let mut state = self.state.write().await;
            if state.generation != generation {
                return Err(Error::NotLoggedOn);
            }
            let mut round = LoginRound::new(state.end.clone());
            for (link, result) in answers {
                match result {
                    Ok(expire) => {
                        round.events.extend(state.two_factor.on_success(link, expire));
                        round.logged_on |= state.tracker.complete(L::login_flag(link));
                        round.logged_in.push(link);
                    }
                    Err(e) => {
                        warn!(session = L::NAME, link = ?link, error = %e, "Two-factor response rejected");
                        round.events.extend(state.two_factor.on_error(link, e.to_string()));
                        first_error.get_or_insert(e);
                    }
                }
            }
            round
        };
        self.finish_login_round(generation, round).await;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) async fn two_factor_resume(&self, timeout: Duration) -> Result<DateTime<Utc>> {
        self.ensure_logged_on()?;
        let generation = {
            let mut state = self.state.write().await;
            state.two_factor.begin_resume();
            state.generation
        };

        let (primary, secondary) = tokio::join!(
            request(timeout, self.links.two_factor_resume(Link::Primary)),
            request(timeout, self.links.two_factor_resume(Link::Secondary)),
        );

        let mut first_error = None;
        let (events, expire) = {
            let mut state = self.state.write().await;
            if state.generation != generation {
                return Err(Error::NotLoggedOn);
            }
            let mut events = Vec::new();
            for (link, result) in [(Link::Primary, primary), (Link::Secondary, secondary)] {
                match result {
                    Ok(expire) => events.extend(state.two_factor.on_success(link, expire)),
                    Err(e) => {
                        events.extend(state.two_factor.on_error(link, e.to_string()));
                        first_error.get_or_insert(e);
                    }
                }
            }
            (events, state.two_factor.expire())
        };
        for auth in events {
            self.publish(L::Event::two_factor(auth)).await;
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        expire.ok_or_else(|| Error::TwoFactor("no expiry reported".to_string()))
    }

    pub(crate) async fn two_factor_expire(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.two_factor.expire()
    }

    // Bootstrap and reload steps

    /// Store a loaded value and mark its step; `None` if the attempt is stale.
    pub(crate) async fn complete_step<F>(
        &self,
        generation: u64,
        reload: Option<u64>,
        flag: InitFlags,
        update: F,
    ) -> Option<Step>
    where
        F: FnOnce(&mut L::Cache),
    {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return None;
        }
        update(&mut state.cache);

        let step = match reload {
            None if state.tracker.complete(flag) => Step::LoggedOn,
            Some(reload) if state.tracker.complete_reload(reload, flag) => Step::Reloaded,
            _ => Step::Pending,
        };
        if self.settings.log_states {
            debug!(
                session = L::NAME,
                flag = ?flag,
                missing = ?state.tracker.missing(),
                reload,
                "Step completed"
            );
        }
        Some(step)
    }

    pub(crate) async fn finish_step(self: &Arc<Self>, generation: u64, step: Step) {
        match step {
            Step::Pending => {}
            Step::LoggedOn => {
                info!(session = L::NAME, "Logged on");
                self.publish(L::Event::logon()).await;
                self.logon.set(LogonState::LoggedOn);
                L::on_logon(self, generation);
            }
            Step::Reloaded => {
                info!(session = L::NAME, "Reload completed");
                self.publish(L::Event::config_changed()).await;
            }
        }
    }

    /// Apply a callback to the cache; `false` if the attempt is stale.
    pub(crate) async fn update_cache<F>(&self, generation: u64, update: F) -> bool
    where
        F: FnOnce(&mut L::Cache),
    {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return false;
        }
        update(&mut state.cache);
        true
    }

    pub(crate) async fn on_config_updated(self: &Arc<Self>, generation: u64) {
        let reload = {
            let mut state = self.state.write().await;
            if state.generation != generation || !state.tracker.is_logged_on() {
                None
            } else {
                Some(state.tracker.begin_reload())
            }
        };
        match reload {
            Some(reload) => {
                info!(session = L::NAME, reload, "Configuration changed, reloading");
                L::reload(self, generation, reload);
            }
            None => debug!(session = L::NAME, "Configuration update before logon ignored"),
        }
    }

    pub(crate) async fn reload_failed(&self, error: &Error) {
        warn!(session = L::NAME, error = %error, "Reload failed");
        self.publish(L::Event::notification(Notification::new(
            NotificationType::ConfigUpdated,
            NotificationSeverity::Error,
            format!("Reload failed: {}", error),
        )))
        .await;
    }

    // Supervision

    async fn supervise(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        let mut attempts: u32 = 0;

        loop {
            let (end_tx, mut end_rx) = end_channel();
            let generation = self.begin_attempt(end_tx.clone()).await;
            let session = self.clone();
            self.tasks.spawn(session.run_attempt(generation, end_tx));

            let outcome = next_outcome(&mut end_rx, &mut stop_rx).await;
            self.tasks.abort_all();

            let info = match outcome {
                Outcome::Stopped => {
                    self.shutdown_session().await;
                    break;
                }
                Outcome::Ended(info) => info,
            };

            if self.end_attempt(&info).await {
                attempts = 0;
            }
            if !should_reconnect(&self.settings.reconnect, &info, attempts) {
                info!(session = L::NAME, reason = ?info.reason, attempts, "Will not reconnect");
                break;
            }

            let delay = self.settings.reconnect.backoff_for_attempt(attempts);
            attempts += 1;
            info!(
                session = L::NAME,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting"
            );
            if stopped_during(delay, &mut stop_rx).await {
                break;
            }
        }
    }

    async fn begin_attempt(&self, end: EndSender) -> u64 {
        let mut state = self.state.write().await;
        state.generation += 1;
        state.tracker.reset();
        state.two_factor.reset();
        state.end = Some(end);
        self.logon.set(LogonState::Connecting);
        if self.settings.log_states {
            debug!(session = L::NAME, generation = state.generation, "Connect attempt started");
        }
        state.generation
    }

    /// Tear down after an attempt ended; returns `true` if it had logged on.
    async fn end_attempt(&self, info: &LogoutInfo) -> bool {
        let was_logged_on = self.reset_session().await;
        tokio::join!(
            self.links.disconnect(Link::Primary, &info.text),
            self.links.disconnect(Link::Secondary, &info.text),
        );

        warn!(session = L::NAME, reason = ?info.reason, text = %info.text, "Logged out");
        self.publish(L::Event::logout(info.clone())).await;
        self.logon.set(LogonState::LoggedOut(info.clone()));
        was_logged_on
    }

    async fn shutdown_session(&self) {
        let was_logged_on = self.reset_session().await;
        let timeout = self.settings.operation_timeout;
        if was_logged_on {
            if let Err(e) = self.links.before_logout(timeout).await {
                debug!(session = L::NAME, error = %e, "Cleanup before logout failed");
            }
        }
        let (primary, secondary) = tokio::join!(
            request(timeout, self.links.logout(Link::Primary, CLIENT_LOGOUT)),
            request(timeout, self.links.logout(Link::Secondary, CLIENT_LOGOUT)),
        );
        for (link, result) in [(Link::Primary, primary), (Link::Secondary, secondary)] {
            if let Err(e) = result {
                debug!(session = L::NAME, link = ?link, error = %e, "Logout failed");
            }
        }
        tokio::join!(
            self.links.disconnect(Link::Primary, CLIENT_LOGOUT),
            self.links.disconnect(Link::Secondary, CLIENT_LOGOUT),
        );

        if was_logged_on {
            self.publish(L::Event::logout(LogoutInfo::new(
                LogoutReason::ClientInitiated,
                CLIENT_LOGOUT,
            )))
            .await;
        }
        info!(session = L::NAME, "Session stopped");
    }

    /// Make every callback of the current attempt stale.
    async fn reset_session(&self) -> bool {
        let mut state = self.state.write().await;
        let was_logged_on = state.tracker.is_logged_on();
        state.generation += 1;
        state.tracker.reset();
        state.end = None;
        was_logged_on
    }

    async fn run_attempt(self: Arc<Self>, generation: u64, end: EndSender) {
        let settings = &self.settings;
        let connected = request(settings.connect_timeout, L::connect(&self, generation, &end)).await;
        if let Err(e) = connected {
            warn!(session = L::NAME, address = %settings.address, error = %e, "Connect failed");
            let info = match e {
                Error::Timeout => LogoutInfo::new(LogoutReason::ConnectError, "connect timeout"),
                e => logout_from_error(&e, LogoutReason::ConnectError),
            };
            let _ = end.send(info);
            return;
        }
        info!(session = L::NAME, address = %settings.address, "Connected");

        let credentials = settings.credentials();
        let (primary, secondary) = tokio::join!(
            request(settings.login_timeout, self.links.login(Link::Primary, &credentials)),
            request(settings.login_timeout, self.links.login(Link::Secondary, &credentials)),
        );

        let mut outcomes = Vec::with_capacity(2);
        for (link, result) in [(Link::Primary, primary), (Link::Secondary, secondary)] {
            match result {
                Ok(outcome) => outcomes.push((link, outcome)),
                Err(e) => {
                    warn!(session = L::NAME, link = ?link, error = %e, "Login failed");
                    let _ = end.send(logout_from_error(&e, LogoutReason::Unknown));
                    return;
                }
            }
        }

        // Record every outcome before publishing any event.
        let round = {
            let mut state = self.state.write().await;
            if state.generation != generation {
                return;
            }
            let mut round = LoginRound::new(state.end.clone());
            for (link, outcome) in outcomes {
                match outcome {
                    LoginOutcome::LoggedIn => {
                        round.events.extend(state.two_factor.not_required(link));
                        round.logged_on |= state.tracker.complete(L::login_flag(link));
                        round.logged_in.push(link);
                    }
                    LoginOutcome::TwoFactorRequired => {
                        info!(session = L::NAME, link = ?link, "Two-factor authentication requested");
                        round.events.extend(state.two_factor.on_request(link));
                    }
                }
            }
            round
        };
        self.finish_login_round(generation, round).await;
    }

    async fn finish_login_round(self: &Arc<Self>, generation: u64, round: LoginRound) {
        for auth in round.events {
            self.publish(L::Event::two_factor(auth)).await;
        }
        if round.logged_on {
            self.finish_step(generation, Step::LoggedOn).await;
        }
        let Some(end) = round.end else {
            return;
        };
        for link in round.logged_in {
            info!(session = L::NAME, link = ?link, "Link logged in");
            L::on_link_login(self, link, generation, end.clone());
        }
    }
}

impl LoginRound {
    fn new(end: Option<EndSender>) -> Self {
        Self {
            events: Vec::new(),
            logged_in: Vec::new(),
            logged_on: false,
            end,
        }
    }
}
