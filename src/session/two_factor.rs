//! Two-factor authentication merged over two parallel connections.
//!
//! Each wrapper logs in on two connections at once and either of them may be
//! challenged for a one-time password. Users see a single exchange: one
//! request, one success (or resume) once both connections are satisfied, and
//! at most one error per round.

use chrono::{DateTime, Utc};

use crate::models::{TwoFactorAuth, TwoFactorReason};

/// One of the two connections of a wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    /// Quote feed or order entry
    Primary,
    /// Quote store or trade capture
    Secondary,
}

impl Link {
    /// Both links.
    pub const ALL: [Link; 2] = [Link::Primary, Link::Secondary];

    fn index(self) -> usize {
        match self {
            Link::Primary => 0,
            Link::Secondary => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Idle,
    NotRequired,
    Requested,
    Succeeded(DateTime<Utc>),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Login,
    Resume,
}

/// Merges per-connection two-factor state into user-facing events.
///
/// Each method returns the [`TwoFactorAuth`] event to publish, if any.
#[derive(Debug, Clone)]
pub struct TwoFactorCoordinator {
    slots: [Slot; 2],
    round: Round,
    request_reported: bool,
    error_reported: bool,
}

impl Default for TwoFactorCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl TwoFactorCoordinator {
    /// Fresh coordinator for a login round.
    pub fn new() -> Self {
        Self {
            slots: [Slot::Idle, Slot::Idle],
            round: Round::Login,
            request_reported: false,
            error_reported: false,
        }
    }

    /// Forget everything; used on every connect attempt.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// The link logged in without a challenge.
    ///
    /// Completes a login round if the other link already succeeded.
    pub fn not_required(&mut self, link: Link) -> Option<TwoFactorAuth> {
        self.slots[link.index()] = Slot::NotRequired;
        self.merged_success()
    }

    /// The server asked the link for a one-time password.
    pub fn on_request(&mut self, link: Link) -> Option<TwoFactorAuth> {
        self.slots[link.index()] = Slot::Requested;
        if self.request_reported {
            return None;
        }
        self.request_reported = true;
        Some(TwoFactorAuth {
            reason: TwoFactorReason::ServerRequest,
            text: None,
            expire: None,
        })
    }

    /// Links that still need a one-time password.
    ///
    /// Failed links are included so the user can answer again.
    pub fn awaiting(&self) -> Vec<Link> {
        Link::ALL
            .into_iter()
            .filter(|link| {
                matches!(
                    self.slots[link.index()],
                    Slot::Requested | Slot::Failed(_)
                )
            })
            .collect()
    }

    /// Start answering the challenge; re-arms error reporting.
    pub fn begin_response(&mut self) {
        self.round = Round::Login;
        self.error_reported = false;
        for slot in self.slots.iter_mut() {
            if matches!(slot, Slot::Failed(_)) {
                *slot = Slot::Requested;
            }
        }
    }

    /// Start a resume round; both links must succeed again.
    pub fn begin_resume(&mut self) {
        self.round = Round::Resume;
        self.error_reported = false;
        self.slots = [Slot::Requested, Slot::Requested];
    }

    /// The link accepted the one-time password (or the resume).
    pub fn on_success(&mut self, link: Link, expire: DateTime<Utc>) -> Option<TwoFactorAuth> {
        self.slots[link.index()] = Slot::Succeeded(expire);
        self.merged_success()
    }

    /// The link rejected the one-time password (or the resume).
    pub fn on_error(&mut self, link: Link, text: impl Into<String>) -> Option<TwoFactorAuth> {
        let text = text.into();
        self.slots[link.index()] = Slot::Failed(text.clone());
        if self.error_reported {
            return None;
        }
        self.error_reported = true;
        Some(TwoFactorAuth {
            reason: TwoFactorReason::ServerError,
            text: Some(text),
            expire: self.expire(),
        })
    }

    /// Earliest expiry reported so far.
    pub fn expire(&self) -> Option<DateTime<Utc>> {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Succeeded(expire) => Some(*expire),
                _ => None,
            })
            .min()
    }

    /// Returns `true` if a challenge was seen in this connect attempt.
    pub fn is_active(&self) -> bool {
        self.request_reported || self.round == Round::Resume
    }

    fn merged_success(&self) -> Option<TwoFactorAuth> {
        let settled = self.slots.iter().all(|slot| match slot {
            Slot::Succeeded(_) => true,
            Slot::NotRequired => self.round == Round::Login,
            _ => false,
        });
        let expire = self.expire();
        if !settled || expire.is_none() {
            return None;
        }
        let reason = match self.round {
            Round::Login => TwoFactorReason::ServerSuccess,
            Round::Resume => TwoFactorReason::ServerResume,
        };
        Some(TwoFactorAuth {
            reason,
            text: None,
            expire,
        })
    }
}
