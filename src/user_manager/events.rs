use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::OidcError;
use crate::user::User;
use crate::user_manager::timer::AccessTokenEvents;

pub type EventListener<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

type ListenerList<T> = Arc<Mutex<Vec<(u64, EventListener<T>)>>>;

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Typed publish/subscribe channel for one event.
pub struct EventChannel<T> {
    name: &'static str,
    listeners: ListenerList<T>,
}

impl<T> Clone for EventChannel<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            listeners: self.listeners.clone(),
        }
    }
}

impl<T: 'static> EventChannel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers `listener` until the returned subscription is dropped or
    /// unsubscribed.
    pub fn add_handler<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = LISTENER_ID.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .unwrap()
            .push((id, Arc::new(listener)));

        let listeners = Arc::downgrade(&self.listeners);
        EventSubscription {
            id,
            remover: Arc::new(move |id| {
                if let Some(listeners) = listeners.upgrade() {
                    listeners.lock().unwrap().retain(|(existing, _)| *existing != id);
                }
            }),
            unsubscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Calls every listener registered at the time of the call.
    pub fn raise(&self, value: &T) {
        let listeners: Vec<EventListener<T>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Number of live clones of this channel, pending timer tasks included.
    #[cfg(test)]
    pub(crate) fn clone_count(&self) -> usize {
        Arc::strong_count(&self.listeners)
    }
}

/// Registration handle returned by [`EventChannel::add_handler`]. Dropping
/// the handle removes the listener.
#[derive(Clone)]
pub struct EventSubscription {
    id: u64,
    remover: Arc<dyn Fn(u64) + Send + Sync + 'static>,
    unsubscribed: Arc<AtomicBool>,
}

impl EventSubscription {
    pub fn unsubscribe(&self) {
        if self
            .unsubscribed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            (self.remover)(self.id);
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription").field("id", &self.id).finish()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Events raised by [`crate::user_manager::UserManager`].
pub struct UserManagerEvents {
    access_token: AccessTokenEvents,
    user_loaded: EventChannel<User>,
    user_unloaded: EventChannel<()>,
    silent_renew_error: EventChannel<OidcError>,
    user_signed_out: EventChannel<()>,
    user_session_changed: EventChannel<()>,
}

impl UserManagerEvents {
    pub fn new(expiring_notification_secs: u64) -> Self {
        Self {
            access_token: AccessTokenEvents::new(expiring_notification_secs),
            user_loaded: EventChannel::new("user_loaded"),
            user_unloaded: EventChannel::new("user_unloaded"),
            silent_renew_error: EventChannel::new("silent_renew_error"),
            user_signed_out: EventChannel::new("user_signed_out"),
            user_session_changed: EventChannel::new("user_session_changed"),
        }
    }

    /// Re-arms the access token timers for `user`; raises `user_loaded`
    /// when `raise_event` is set.
    pub(crate) fn load(&self, user: &User, raise_event: bool) {
        self.access_token.load(user);
        if raise_event {
            self.user_loaded.raise(user);
        }
    }

    /// Cancels the timers and raises `user_unloaded`.
    pub(crate) fn unload(&self) {
        self.access_token.unload();
        self.user_unloaded.raise(&());
    }

    pub(crate) fn cancel_timers(&self) {
        self.access_token.unload();
    }

    pub fn add_access_token_expiring<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.access_token.add_access_token_expiring(listener)
    }

    pub fn add_access_token_expired<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.access_token.add_access_token_expired(listener)
    }

    pub fn add_user_loaded<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&User) + Send + Sync + 'static,
    {
        self.user_loaded.add_handler(listener)
    }

    pub fn add_user_unloaded<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.user_unloaded.add_handler(listener)
    }

    pub fn add_silent_renew_error<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&OidcError) + Send + Sync + 'static,
    {
        self.silent_renew_error.add_handler(listener)
    }

    pub fn add_user_signed_out<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.user_signed_out.add_handler(listener)
    }

    pub fn add_user_session_changed<F>(&self, listener: F) -> EventSubscription
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.user_session_changed.add_handler(listener)
    }

    pub(crate) fn raise_silent_renew_error(&self, error: &OidcError) {
        self.silent_renew_error.raise(error);
    }

    pub(crate) fn raise_user_signed_out(&self) {
        self.user_signed_out.raise(&());
    }

    pub(crate) fn raise_user_session_changed(&self) {
        self.user_session_changed.raise(&());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dropping_subscription_removes_listener() {
        let channel: EventChannel<u32> = EventChannel::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = channel.add_handler(move |value| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        });

        channel.raise(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        drop(subscription);
        channel.raise(&5);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn listener_may_unsubscribe_while_raising() {
        let channel: EventChannel<()> = EventChannel::new("test");
        let slot: Arc<Mutex<Option<EventSubscription>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        let subscription = channel.add_handler(move |_| {
            inner.lock().unwrap().take();
        });
        *slot.lock().unwrap() = Some(subscription);

        channel.raise(&());
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn user_loaded_receives_user() {
        let events = UserManagerEvents::new(60);
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let _subscription = events.add_user_loaded(move |user: &User| {
            *sink.lock().unwrap() = user.access_token.clone();
        });

        let user = User {
            access_token: Some("at".into()),
            ..Default::default()
        };
        events.load(&user, true);
        events.cancel_timers();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("at"));
    }
}
