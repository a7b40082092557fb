use serde::{Deserialize, Deserializer};

use crate::types::user::SettingsUpdate;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserSettings {
    pub(crate) reminder_email: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub(crate) telegram_username: Option<Option<String>>,
    pub(crate) time_zone: Option<String>,
}

// Tells an explicit `null` apart from an omitted field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl From<UserSettings> for SettingsUpdate {
    fn from(settings: UserSettings) -> Self {
        SettingsUpdate {
            reminder_email: settings.reminder_email,
            telegram_username: settings.telegram_username,
            time_zone: settings.time_zone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_telegram_username_unlinks() {
        let settings: UserSettings =
            serde_json::from_str(r#"{"telegramUsername": null}"#).unwrap();

        assert_eq!(settings.telegram_username, Some(None));
    }

    #[test]
    fn omitted_telegram_username_is_untouched() {
        let settings: UserSettings =
            serde_json::from_str(r#"{"timeZone": "Europe/Moscow"}"#).unwrap();

        assert_eq!(settings.telegram_username, None);
        assert_eq!(settings.time_zone.as_deref(), Some("Europe/Moscow"));
    }
}
