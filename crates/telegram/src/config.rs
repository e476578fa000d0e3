use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
pub const DEFAULT_FILE_BASE_URL: &str = "https://api.telegram.org/file/bot";

/// Configuration for one Telegram bot connection.
///
/// Supplied fully deserialized by an external loader; everything except the
/// token has a working default.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Bot API base URL (override for self-hosted API servers).
    pub api_base_url: String,

    /// Base URL for file downloads; the token and file path are appended.
    pub file_base_url: String,

    /// Publish the collected command registry to the platform on startup.
    pub command_register: bool,

    /// Periodically re-sync the command registry while running.
    pub command_auto_refresh: bool,

    /// Interval between command registry refreshes, in seconds.
    pub command_refresh_secs: u64,

    /// Greeting sent in response to `/start`.
    pub greeting: String,

    /// Minimum interval between streaming edit-in-place updates (ms).
    pub edit_throttle_ms: u64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("command_register", &self.command_register)
            .field("command_auto_refresh", &self.command_auto_refresh)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            file_base_url: DEFAULT_FILE_BASE_URL.to_string(),
            command_register: true,
            command_auto_refresh: true,
            command_refresh_secs: 300,
            greeting: "Hello! I am online and ready to chat.".to_string(),
            edit_throttle_ms: 600,
        }
    }
}
