use std::sync::Mutex;
use std::time::Duration;

use futures::future::{abortable, AbortHandle};

use crate::platform::runtime::{sleep, spawn_detached};
use crate::user::User;
use crate::user_manager::events::{EventChannel, EventSubscription};

/// One-shot timer that raises its channel once the delay elapses. Calling
/// [`Timer::init`] again replaces the pending expiry. Cancelling aborts the
/// sleeping task right away.
pub struct Timer {
    channel: EventChannel<()>,
    pending: Mutex<Option<AbortHandle>>,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            channel: EventChannel::new(name),
            pending: Mutex::new(None),
        }
    }

    pub fn init(&self, delay: Duration) {
        let channel = self.channel.clone();
        let (expiry, handle) = abortable(async move {
            sleep(delay).await;
            channel.raise(&());
        });
        if let Some(previous) = self.pending.lock().unwrap().replace(handle) {
            previous.abort();
        }

        spawn_detached(async move {
            let _ = expiry.await;
        });
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().unwrap().take() {
            handle.abort();
        }
    }

    pub fn add_handler<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.channel.add_handler(listener)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// `access_token_expiring` / `access_token_expired` timers derived from a
/// user's `expires_at`.
pub struct AccessTokenEvents {
    expiring_notification_secs: u64,
    expiring: Timer,
    expired: Timer,
}

impl AccessTokenEvents {
    pub fn new(expiring_notification_secs: u64) -> Self {
        Self {
            expiring_notification_secs,
            expiring: Timer::new("access_token_expiring"),
            expired: Timer::new("access_token_expired"),
        }
    }

    pub fn load(&self, user: &User) {
        let remaining = match (&user.access_token, user.expires_in()) {
            (Some(_), Some(remaining)) => remaining,
            _ => {
                self.unload();
                return;
            }
        };

        if remaining > 0 {
            let expiring = remaining.saturating_sub(self.expiring_notification_secs as i64);
            self.expiring.init(Duration::from_secs(expiring.max(1) as u64));
        } else {
            self.expiring.cancel();
        }

        let expired = remaining.saturating_add(1).max(0) as u64;
        self.expired.init(Duration::from_secs(expired));
    }

    pub fn unload(&self) {
        self.expiring.cancel();
        self.expired.cancel();
    }

    pub fn add_access_token_expiring<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.expiring.add_handler(listener)
    }

    pub fn add_access_token_expired<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.expired.add_handler(listener)
    }
}
