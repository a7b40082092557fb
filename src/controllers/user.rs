use std::sync::Arc;

use regex::Regex;

use crate::core::error::{self, Error};
use crate::core::store::UserStore;
use crate::types::request::UserSettings;
use crate::types::user::{SettingsUpdate, User, UserId};

#[derive(Clone)]
pub(crate) struct UserController {
    store: Arc<dyn UserStore>,
    email_pattern: Regex,
}

impl std::fmt::Debug for UserController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserController")
            .field("email_pattern", &self.email_pattern.as_str())
            .finish()
    }
}

impl UserController {
    pub(crate) fn new(store: Arc<dyn UserStore>) -> Result<Self, error::ConfigError> {
        Ok(Self {
            store,
            email_pattern: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")?,
        })
    }

    pub(crate) async fn get(&self, id: UserId) -> Result<User, Error> {
        self.store.find_by_id(id).await?.ok_or(Error::UserNotFound)
    }

    pub(crate) async fn update_settings(
        &self,
        id: UserId,
        settings: UserSettings,
    ) -> Result<User, Error> {
        let update = self.validate(settings)?;

        self.store
            .update_settings(id, &update)
            .await?
            .ok_or(Error::UserNotFound)
    }

    pub(crate) async fn delete(&self, id: UserId) -> Result<(), Error> {
        match self.store.delete(id).await? {
            true => Ok(()),
            false => Err(Error::UserNotFound),
        }
    }

    fn validate(&self, settings: UserSettings) -> Result<SettingsUpdate, Error> {
        let mut update = SettingsUpdate::from(settings);

        if let Some(reminder_email) = &update.reminder_email {
            if !self.email_pattern.is_match(reminder_email) {
                return Err(Error::Validation(
                    "The email must be in the correct format.".to_owned(),
                ));
            }
        }

        if let Some(time_zone) = &update.time_zone {
            if time_zone.trim().is_empty() {
                return Err(Error::Validation("Time zone must not be blank.".to_owned()));
            }
        }

        // a blank username means unlinking, same as null
        if let Some(Some(username)) = &update.telegram_username {
            let username = username.trim().trim_start_matches('@');
            update.telegram_username = Some((!username.is_empty()).then(|| username.to_owned()));
        }

        Ok(update)
    }
}
