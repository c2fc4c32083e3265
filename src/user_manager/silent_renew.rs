use std::sync::{Mutex, Weak};

use crate::logger::Logger;
use crate::oidc_client::SigninArgs;
use crate::platform::runtime::spawn_detached;
use crate::user_manager::api::UserManager;
use crate::user_manager::events::{EventSubscription, UserManagerEvents};

/// Runs `signin_silent` whenever `access_token_expiring` fires.
pub(crate) struct SilentRenewService {
    subscription: Mutex<Option<EventSubscription>>,
    logger: Logger,
}

impl SilentRenewService {
    pub(crate) fn new(logger: Logger) -> Self {
        Self {
            subscription: Mutex::new(None),
            logger,
        }
    }

    pub(crate) fn is_started(&self) -> bool {
        self.subscription.lock().unwrap().is_some()
    }

    /// Subscribes to `access_token_expiring`. Calling it again while
    /// started has no effect.
    pub(crate) fn start(&self, events: &UserManagerEvents, manager: Weak<UserManager>) {
        let mut guard = self.subscription.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let logger = self.logger.clone();
        let subscription = events.add_access_token_expiring(move |_| {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let logger = logger.clone();
            spawn_detached(async move {
                logger.debug("access token expiring; renewing silently");
                match manager.signin_silent(SigninArgs::default()).await {
                    Ok(_) => logger.debug("silent renew succeeded"),
                    Err(err) => {
                        logger.error(format!("silent renew failed: {err}"));
                        manager.events().raise_silent_renew_error(&err);
                    }
                }
            });
        });
        *guard = Some(subscription);
        self.logger.debug("silent renew started");
    }

    pub(crate) fn stop(&self) {
        if self.subscription.lock().unwrap().take().is_some() {
            self.logger.debug("silent renew stopped");
        }
    }
}
