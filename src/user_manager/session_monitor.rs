use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{abortable, AbortHandle};

use crate::error::OidcResult;
use crate::logger::Logger;
use crate::oidc_client::SigninArgs;
use crate::platform::runtime::{sleep, spawn_detached};
use crate::user::User;
use crate::user_manager::api::UserManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckSessionStatus {
    Unchanged,
    Changed,
    Error,
}

/// Session status reported by a `prompt=none` request.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub session_state: String,
    pub sub: String,
    pub sid: Option<String>,
}

/// OP session-state check (OIDC Session Management), typically backed by the
/// provider's `check_session_iframe`.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait CheckSession: Send + Sync {
    async fn start(&self, session_state: &str) -> OidcResult<()>;
    async fn poll(&self) -> OidcResult<CheckSessionStatus>;
    async fn stop(&self);
}

pub(crate) struct SessionMonitor {
    check_session: Arc<dyn CheckSession>,
    interval: Duration,
    running: Mutex<Option<MonitorHandle>>,
    logger: Logger,
}

/// The loop's own flag covers the window after it has decided to stop; the
/// abort handle ends a pending sleep or query at once.
struct MonitorHandle {
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl MonitorHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
    }
}

struct Subject {
    sub: String,
    sid: Option<String>,
    session_state: String,
}

impl SessionMonitor {
    pub(crate) fn new(check_session: Arc<dyn CheckSession>, interval: Duration, logger: Logger) -> Self {
        Self {
            check_session,
            interval,
            running: Mutex::new(None),
            logger,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }

    /// Starts polling for `user`'s session. Users without `session_state`
    /// or `sub` are not monitored.
    pub(crate) fn start(&self, manager: Weak<UserManager>, user: &User) {
        let (Some(session_state), Some(sub)) = (user.session_state.clone(), user.subject()) else {
            self.logger
                .debug("start: user has no session_state or sub; not monitoring");
            return;
        };
        let subject = Subject {
            sub: sub.to_string(),
            sid: user.session_id().map(str::to_string),
            session_state,
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let (task, abort) = abortable(monitor(
            self.check_session.clone(),
            manager,
            subject,
            self.interval,
            cancelled.clone(),
            self.logger.clone(),
        ));
        let handle = MonitorHandle { cancelled, abort };
        if let Some(previous) = self.running.lock().unwrap().replace(handle) {
            previous.cancel();
        }

        spawn_detached(async move {
            let _ = task.await;
        });
    }

    pub(crate) fn stop(&self) {
        if let Some(handle) = self.running.lock().unwrap().take() {
            handle.cancel();
            let check_session = self.check_session.clone();
            spawn_detached(async move {
                check_session.stop().await;
            });
        }
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.running.lock().unwrap().take() {
            handle.cancel();
        }
    }
}

async fn monitor(
    check_session: Arc<dyn CheckSession>,
    manager: Weak<UserManager>,
    mut subject: Subject,
    interval: Duration,
    cancelled: Arc<AtomicBool>,
    logger: Logger,
) {
    if let Err(err) = check_session.start(&subject.session_state).await {
        logger.warn(format!("check session failed to start: {err}"));
        return;
    }

    loop {
        sleep(interval).await;
        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        match check_session.poll().await {
            Ok(CheckSessionStatus::Unchanged) => continue,
            Ok(CheckSessionStatus::Error) => {
                logger.warn("check session reported an error");
                continue;
            }
            Err(err) => {
                logger.warn(format!("check session poll failed: {err}"));
                continue;
            }
            Ok(CheckSessionStatus::Changed) => {}
        }

        let Some(manager) = manager.upgrade() else {
            return;
        };
        let status = manager.query_session_status(SigninArgs::default()).await;
        if cancelled.load(Ordering::SeqCst) {
            return;
        }

        match status {
            Ok(Some(status)) if status.sub == subject.sub => {
                if let Err(err) = check_session.start(&status.session_state).await {
                    logger.warn(format!("check session failed to restart: {err}"));
                }
                subject.session_state = status.session_state;
                if status.sid != subject.sid {
                    logger.debug("same subject with a new session; raising user_session_changed");
                    subject.sid = status.sid;
                    manager.events().raise_user_session_changed();
                }
            }
            Ok(Some(_)) => {
                logger.debug("different subject signed in at the provider");
                signed_out(check_session.as_ref(), &manager, &cancelled).await;
                return;
            }
            Ok(None) => {
                logger.debug("subject no longer signed in at the provider");
                signed_out(check_session.as_ref(), &manager, &cancelled).await;
                return;
            }
            Err(err) => {
                logger.debug(format!("session status query failed: {err}"));
                signed_out(check_session.as_ref(), &manager, &cancelled).await;
                return;
            }
        }
    }
}

async fn signed_out(check_session: &dyn CheckSession, manager: &UserManager, cancelled: &AtomicBool) {
    cancelled.store(true, Ordering::SeqCst);
    check_session.stop().await;
    manager.events().raise_user_signed_out();
}
