use serde::Serialize;

use crate::types::user::{User, UserId};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserResponse {
    pub(crate) id: UserId,
    pub(crate) email: String,
    pub(crate) reminder_email: String,
    pub(crate) telegram_username: Option<String>,
    pub(crate) time_zone: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            reminder_email: user.reminder_email,
            telegram_username: user.telegram_username,
            time_zone: user.time_zone,
        }
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct Token {
    pub(crate) token: String,
}

impl Token {
    pub(crate) fn new(token: String) -> Self {
        Self { token }
    }
}
