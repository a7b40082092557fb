use std::sync::Arc;

use crate::core::error::Error;
use crate::core::store::UserStore;
use crate::types::user::{NewUser, User};

/// Maps a verified email to its local user, creating the row on first sight.
/// At most one user exists per email; concurrent first logins all end up
/// with the row that won the insert.
#[derive(Clone)]
pub(crate) struct IdentityBinder {
    store: Arc<dyn UserStore>,
}

impl std::fmt::Debug for IdentityBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityBinder").finish()
    }
}

impl IdentityBinder {
    pub(crate) fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn bind_or_create(&self, email: &str) -> Result<User, Error> {
        if let Some(user) = self.store.find_by_email(email).await? {
            return Ok(user);
        }

        match self.store.insert(&NewUser::with_defaults(email)).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "Created user on first login");
                Ok(user)
            }
            Err(Error::UserAlreadyExists) => {
                tracing::debug!("Lost user creation race, reading the winning row");

                self.store
                    .find_by_email(email)
                    .await?
                    .ok_or(Error::Internal)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::memory::MemoryUserStore;
    use crate::types::user::{SettingsUpdate, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Misses the first lookup and loses the insert, as if another login
    /// created the row in between.
    struct LostRace {
        winner: User,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl UserStore for LostRace {
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, Error> {
            match self.lookups.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(None),
                _ => Ok(Some(self.winner.clone())),
            }
        }

        async fn find_by_id(&self, _id: UserId) -> Result<Option<User>, Error> {
            Ok(None)
        }

        async fn insert(&self, _user: &NewUser) -> Result<User, Error> {
            Err(Error::UserAlreadyExists)
        }

        async fn update_settings(
            &self,
            _id: UserId,
            _update: &SettingsUpdate,
        ) -> Result<Option<User>, Error> {
            Ok(None)
        }

        async fn delete(&self, _id: UserId) -> Result<bool, Error> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn creates_user_with_defaults() {
        let binder = IdentityBinder::new(Arc::new(MemoryUserStore::default()));

        let user = binder.bind_or_create("a@b.com").await.unwrap();

        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.reminder_email, "a@b.com");
        assert_eq!(user.time_zone, "UTC");
        assert!(user.telegram_username.is_none());
        assert!(user.telegram_chat_id.is_none());
    }

    #[tokio::test]
    async fn second_bind_returns_same_user() {
        let binder = IdentityBinder::new(Arc::new(MemoryUserStore::default()));

        let first = binder.bind_or_create("a@b.com").await.unwrap();
        let second = binder.bind_or_create("a@b.com").await.unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn existing_user_is_returned_unchanged() {
        let store = Arc::new(MemoryUserStore::default());
        let binder = IdentityBinder::new(store.clone());

        let created = binder.bind_or_create("a@b.com").await.unwrap();
        store.link_telegram(created.id, "alice", 42).await;

        let bound = binder.bind_or_create("a@b.com").await.unwrap();

        assert_eq!(bound.telegram_username.as_deref(), Some("alice"));
        assert_eq!(bound.telegram_chat_id, Some(42));
    }

    #[tokio::test]
    async fn distinct_emails_get_distinct_users() {
        let binder = IdentityBinder::new(Arc::new(MemoryUserStore::default()));

        let a = binder.bind_or_create("a@b.com").await.unwrap();
        let c = binder.bind_or_create("c@d.com").await.unwrap();

        assert_ne!(a.id, c.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_logins_share_one_row() {
        let store = Arc::new(MemoryUserStore::default());
        let binder = IdentityBinder::new(store.clone());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let binder = binder.clone();
                tokio::spawn(async move { binder.bind_or_create("new@b.com").await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }

        assert_eq!(store.count_by_email("new@b.com").await, 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn lost_insert_returns_winning_row() {
        let winner = User {
            id: 41,
            email: "a@b.com".to_owned(),
            reminder_email: "a@b.com".to_owned(),
            telegram_username: None,
            telegram_chat_id: None,
            time_zone: "UTC".to_owned(),
        };
        let store = Arc::new(LostRace {
            winner: winner.clone(),
            lookups: AtomicUsize::new(0),
        });
        let binder = IdentityBinder::new(store.clone());

        let user = binder.bind_or_create("a@b.com").await.unwrap();

        assert_eq!(user, winner);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }
}
