//! Process-wide authentication context.
//!
//! Holds the current bearer credential (or none for guests) and lets any
//! number of observers follow its changes. The session controller receives
//! a clone at construction instead of reading a global.

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::Credential;

/// Cloneable handle to the shared credential
#[derive(Debug, Clone)]
pub struct AuthContext {
    tx: Arc<watch::Sender<Option<Credential>>>,
}

impl AuthContext {
    /// Context with nobody logged in
    pub fn new() -> Self {
        Self::with_credential(None)
    }

    pub fn with_credential(credential: Option<Credential>) -> Self {
        let (tx, _rx) = watch::channel(credential);
        Self { tx: Arc::new(tx) }
    }

    /// Store a new credential. Observers are notified only if it changed.
    pub fn set(&self, credential: Credential) {
        self.replace(Some(credential));
    }

    /// Forget the credential (logout)
    pub fn clear(&self) {
        self.replace(None);
    }

    pub fn current(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every subsequent change
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.tx.subscribe()
    }

    fn replace(&self, credential: Option<Credential>) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == credential {
                return false;
            }
            *current = credential;
            true
        });
        if changed {
            tracing::debug!("Credential changed");
        }
    }
}

impl Default for AuthContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_notifies_subscribers() {
        // テスト項目: set で購読者に変更が通知される
        // given (前提条件):
        let auth = AuthContext::new();
        let mut rx = auth.subscribe();

        // when (操作):
        auth.set(Credential::new("tok-A").unwrap());

        // then (期待する結果):
        assert!(rx.has_changed().unwrap());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(Credential::new("tok-A").unwrap()));
        assert_eq!(auth.current(), Some(Credential::new("tok-A").unwrap()));
    }

    #[test]
    fn test_setting_same_credential_does_not_notify() {
        // テスト項目: 同じクレデンシャルを再設定しても通知されない
        // given (前提条件):
        let auth = AuthContext::with_credential(Some(Credential::new("tok-A").unwrap()));
        let rx = auth.subscribe();

        // when (操作):
        auth.set(Credential::new("tok-A").unwrap());

        // then (期待する結果):
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_clear_is_shared_between_clones() {
        // テスト項目: clone 間で状態が共有され、clear でクレデンシャルが消える
        // given (前提条件):
        let auth = AuthContext::with_credential(Some(Credential::new("tok-A").unwrap()));
        let other = auth.clone();
        let rx = auth.subscribe();

        // when (操作):
        other.clear();

        // then (期待する結果):
        assert_eq!(auth.current(), None);
        assert!(rx.has_changed().unwrap());
    }
}
