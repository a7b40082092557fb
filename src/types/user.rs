use crate::core::error::Error;

pub(crate) type UserId = i64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct User {
    pub(crate) id: UserId,
    pub(crate) email: String,
    pub(crate) reminder_email: String,
    pub(crate) telegram_username: Option<String>,
    pub(crate) telegram_chat_id: Option<i64>,
    pub(crate) time_zone: String,
}

/// A user row that has not been persisted yet.
#[derive(Clone, Debug)]
pub(crate) struct NewUser {
    pub(crate) email: String,
    pub(crate) reminder_email: String,
    pub(crate) time_zone: String,
}

impl NewUser {
    pub(crate) const DEFAULT_TIME_ZONE: &'static str = "UTC";

    pub(crate) fn with_defaults(email: &str) -> Self {
        Self {
            email: email.to_owned(),
            reminder_email: email.to_owned(),
            time_zone: Self::DEFAULT_TIME_ZONE.to_owned(),
        }
    }
}

/// Settings changes requested by the owner of the account. `None` leaves a
/// field untouched, except for the Telegram username where `Some(None)`
/// unlinks the account.
#[derive(Clone, Debug, Default)]
pub(crate) struct SettingsUpdate {
    pub(crate) reminder_email: Option<String>,
    pub(crate) telegram_username: Option<Option<String>>,
    pub(crate) time_zone: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    User,
}

/// The caller of the current request, as seen by handlers.
#[derive(Clone, Debug)]
pub(crate) struct Principal {
    user: User,
    role: Role,
}

impl Principal {
    pub(crate) fn new(user: User) -> Self {
        Self {
            user,
            role: Role::User,
        }
    }

    pub(crate) fn local_user_id(&self) -> UserId {
        self.user.id
    }

    pub(crate) fn user(&self) -> &User {
        &self.user
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn require(&self, role: Role) -> Result<&Self, Error> {
        if self.role() == role {
            Ok(self)
        } else {
            Err(Error::Forbidden)
        }
    }
}
