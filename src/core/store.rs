use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::core::error::{ConfigError, Error};
use crate::types::user::{NewUser, SettingsUpdate, User, UserId};

#[async_trait]
pub(crate) trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error>;

    /// Fails with [`Error::UserAlreadyExists`] when another row already owns
    /// the email.
    async fn insert(&self, user: &NewUser) -> Result<User, Error>;

    async fn update_settings(
        &self,
        id: UserId,
        update: &SettingsUpdate,
    ) -> Result<Option<User>, Error>;

    async fn delete(&self, id: UserId) -> Result<bool, Error>;
}

#[derive(Clone, Debug)]
pub(crate) struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub(crate) async fn connect(database_url: &str) -> Result<Self, ConfigError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        match sqlx::query(
            "SELECT id, email, reminder_email, telegram_username, telegram_chat_id, time_zone
            FROM users
            WHERE email = $1;",
        )
        .bind(email)
        .map(map_user)
        .fetch_one(&self.pool)
        .await
        {
            Ok(user) => Ok(Some(user)),
            Err(sqlx::Error::RowNotFound) => Ok(None),
            Err(e) => Err(Error::Sql(e)),
        }
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        match sqlx::query(
            "SELECT id, email, reminder_email, telegram_username, telegram_chat_id, time_zone
            FROM users
            WHERE id = $1;",
        )
        .bind(id)
        .map(map_user)
        .fetch_one(&self.pool)
        .await
        {
            Ok(user) => Ok(Some(user)),
            Err(sqlx::Error::RowNotFound) => Ok(None),
            Err(e) => Err(Error::Sql(e)),
        }
    }

    async fn insert(&self, user: &NewUser) -> Result<User, Error> {
        match sqlx::query(
            "INSERT INTO users (email, reminder_email, time_zone) VALUES ($1, $2, $3) RETURNING
                id,
                email,
                reminder_email,
                telegram_username,
                telegram_chat_id,
                time_zone;",
        )
        .bind(&user.email)
        .bind(&user.reminder_email)
        .bind(&user.time_zone)
        .map(map_user)
        .fetch_one(&self.pool)
        .await
        {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(Error::UserAlreadyExists)
            }
            Err(e) => Err(Error::Sql(e)),
        }
    }

    async fn update_settings(
        &self,
        id: UserId,
        update: &SettingsUpdate,
    ) -> Result<Option<User>, Error> {
        let (touch_telegram, telegram_username) = match &update.telegram_username {
            Some(username) => (true, username.clone()),
            None => (false, None),
        };

        // a changed or cleared username invalidates the linked chat
        match sqlx::query(
            "UPDATE users SET
                reminder_email = COALESCE($2, reminder_email),
                telegram_username = CASE WHEN $3 THEN $4 ELSE telegram_username END,
                telegram_chat_id = CASE
                    WHEN $3 AND telegram_username IS DISTINCT FROM $4 THEN NULL
                    ELSE telegram_chat_id
                END,
                time_zone = COALESCE($5, time_zone)
            WHERE id = $1
            RETURNING
                id,
                email,
                reminder_email,
                telegram_username,
                telegram_chat_id,
                time_zone;",
        )
        .bind(id)
        .bind(update.reminder_email.as_deref())
        .bind(touch_telegram)
        .bind(telegram_username)
        .bind(update.time_zone.as_deref())
        .map(map_user)
        .fetch_one(&self.pool)
        .await
        {
            Ok(user) => Ok(Some(user)),
            Err(sqlx::Error::RowNotFound) => Ok(None),
            Err(e) => Err(Error::Sql(e)),
        }
    }

    async fn delete(&self, id: UserId) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1;")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_user(row: PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        reminder_email: row.get("reminder_email"),
        telegram_username: row.get("telegram_username"),
        telegram_chat_id: row.get("telegram_chat_id"),
        time_zone: row.get("time_zone"),
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::Mutex;

    /// Keeps rows in memory and enforces the same email uniqueness as the
    /// `users` table.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryUserStore {
        rows: Mutex<Vec<User>>,
        last_id: AtomicI64,
    }

    impl MemoryUserStore {
        pub(crate) async fn count_by_email(&self, email: &str) -> usize {
            self.rows
                .lock()
                .await
                .iter()
                .filter(|user| user.email == email)
                .count()
        }

        pub(crate) async fn link_telegram(&self, id: UserId, username: &str, chat_id: i64) {
            if let Some(user) = self.rows.lock().await.iter_mut().find(|user| user.id == id) {
                user.telegram_username = Some(username.to_owned());
                user.telegram_chat_id = Some(chat_id);
            }
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
            let found = self
                .rows
                .lock()
                .await
                .iter()
                .find(|user| user.email == email)
                .cloned();

            // let concurrent callers interleave between lookup and insert
            tokio::task::yield_now().await;

            Ok(found)
        }

        async fn find_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .find(|user| user.id == id)
                .cloned())
        }

        async fn insert(&self, user: &NewUser) -> Result<User, Error> {
            let mut rows = self.rows.lock().await;

            if rows.iter().any(|row| row.email == user.email) {
                return Err(Error::UserAlreadyExists);
            }

            let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
            let user = User {
                id,
                email: user.email.clone(),
                reminder_email: user.reminder_email.clone(),
                telegram_username: None,
                telegram_chat_id: None,
                time_zone: user.time_zone.clone(),
            };

            rows.push(user.clone());

            Ok(user)
        }

        async fn update_settings(
            &self,
            id: UserId,
            update: &SettingsUpdate,
        ) -> Result<Option<User>, Error> {
            let mut rows = self.rows.lock().await;

            let Some(user) = rows.iter_mut().find(|user| user.id == id) else {
                return Ok(None);
            };

            if let Some(reminder_email) = &update.reminder_email {
                user.reminder_email = reminder_email.clone();
            }

            if let Some(telegram_username) = &update.telegram_username {
                if &user.telegram_username != telegram_username {
                    user.telegram_chat_id = None;
                }
                user.telegram_username = telegram_username.clone();
            }

            if let Some(time_zone) = &update.time_zone {
                user.time_zone = time_zone.clone();
            }

            Ok(Some(user.clone()))
        }

        async fn delete(&self, id: UserId) -> Result<bool, Error> {
            let mut rows = self.rows.lock().await;
            let before = rows.len();
            rows.retain(|user| user.id != id);

            Ok(rows.len() != before)
        }
    }
}
