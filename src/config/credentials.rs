use std::fmt;

use super::ConfigError;

pub const APP_ID_VAR: &str = "QA_SEARCH_CHAT_APP_ID";
pub const API_KEY_VAR: &str = "QA_SEARCH_CHAT_API_KEY";
pub const API_SECRET_VAR: &str = "QA_SEARCH_CHAT_API_SECRET";

/// Credentials for the chat rewrite service.
///
/// Only ever read from the process environment, once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct ChatCredentials {
    pub app_id: String,
    pub api_key: String,
    pub api_secret: String,
}

impl ChatCredentials {
    /// Read all three variables from the environment.
    ///
    /// Returns `Ok(None)` when none are set and an error when only some are.
    #[inline]
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let app_id = read(APP_ID_VAR);
        let api_key = read(API_KEY_VAR);
        let api_secret = read(API_SECRET_VAR);

        match (app_id, api_key, api_secret) {
            (Some(app_id), Some(api_key), Some(api_secret)) => Ok(Some(Self {
                app_id,
                api_key,
                api_secret,
            })),
            (None, None, None) => Ok(None),
            (app_id, api_key, api_secret) => {
                let missing: Vec<&str> = [
                    (APP_ID_VAR, app_id.is_none()),
                    (API_KEY_VAR, api_key.is_none()),
                    (API_SECRET_VAR, api_secret.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(ConfigError::IncompleteCredentials(missing.join(", ")))
            }
        }
    }
}

impl fmt::Debug for ChatCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCredentials")
            .field("app_id", &self.app_id)
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}
