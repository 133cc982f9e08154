use tokio::sync::watch;

use super::ProviderUser;

/// Identity state as published by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStateEvent {
    /// The provider has not finished rehydrating its persisted session yet.
    Pending,
    SignedIn(ProviderUser),
    SignedOut,
}

impl AuthStateEvent {
    #[must_use]
    pub fn user(&self) -> Option<&ProviderUser> {
        match self {
            Self::SignedIn(user) => Some(user),
            _ => None,
        }
    }
}

/// Auth-state subscription hub.
///
/// Delivery is last-value-wins and at-least-once: a subscriber that falls
/// behind skips intermediate states but always observes the latest one, and
/// every publication marks the value as changed even when it repeats.
#[derive(Debug)]
pub struct AuthStateObserver {
    tx: watch::Sender<AuthStateEvent>,
}

impl AuthStateObserver {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthStateEvent::Pending);
        Self { tx }
    }

    pub fn publish(&self, event: AuthStateEvent) {
        tracing::debug!(
            signed_in = event.user().is_some(),
            pending = matches!(event, AuthStateEvent::Pending),
            subscribers = self.tx.receiver_count(),
            "auth state published"
        );
        self.tx.send_replace(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthStateEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> AuthStateEvent {
        self.tx.borrow().clone()
    }

    /// True once the provider has published anything other than `Pending`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        !matches!(*self.tx.borrow(), AuthStateEvent::Pending)
    }
}

impl Default for AuthStateObserver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_pending() {
        let observer = AuthStateObserver::new();
        assert_eq!(observer.current(), AuthStateEvent::Pending);
        assert!(!observer.is_ready());
    }

    #[tokio::test]
    async fn late_subscriber_sees_last_value() {
        let observer = AuthStateObserver::new();
        observer.publish(AuthStateEvent::SignedIn(ProviderUser::new("u1")));
        observer.publish(AuthStateEvent::SignedOut);

        let rx = observer.subscribe();
        assert_eq!(*rx.borrow(), AuthStateEvent::SignedOut);
        assert!(observer.is_ready());
    }

    #[tokio::test]
    async fn repeated_publication_is_delivered() {
        let observer = AuthStateObserver::new();
        let mut rx = observer.subscribe();

        observer.publish(AuthStateEvent::SignedOut);
        rx.changed().await.unwrap();
        rx.borrow_and_update();

        observer.publish(AuthStateEvent::SignedOut);
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn slow_subscriber_skips_to_latest() {
        let observer = AuthStateObserver::new();
        let mut rx = observer.subscribe();

        observer.publish(AuthStateEvent::SignedIn(ProviderUser::new("a")));
        observer.publish(AuthStateEvent::SignedIn(ProviderUser::new("b")));

        rx.changed().await.unwrap();
        let latest = rx.borrow_and_update().clone();
        assert_eq!(latest.user().map(|u| u.uid.as_str()), Some("b"));
    }
}
