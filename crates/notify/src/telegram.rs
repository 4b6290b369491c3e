use async_trait::async_trait;
use daicho_core::config::TelegramConfig;
use daicho_core::notify::error::NotifyError;
use daicho_core::notify::port::Notifier;
use serde::Serialize;

/// # Summary
/// A notifier that pushes settlement outcomes to a Telegram chat
/// via the Bot API.
///
/// # Invariants
/// * `bot_token` must be valid.
/// * `chat_id` must be accessible by the bot.
pub struct TelegramNotifier {
    /// The Bot API token.
    bot_token: String,
    /// The target Chat ID.
    chat_id: String,
    /// The HTTP client used for requests.
    client: reqwest::Client,
}

/// # Summary
/// Payload structure for the Telegram `sendMessage` API.
#[derive(Serialize)]
struct TelegramMessage {
    chat_id: String,
    text: String,
    parse_mode: String,
}

impl TelegramNotifier {
    /// # Summary
    /// Creates a new `TelegramNotifier` with a default HTTP client.
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }

    /// Builds a notifier straight from the application config section.
    pub fn from_config(config: &TelegramConfig) -> Self {
        Self::new(config.bot_token.clone(), config.chat_id.clone())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    /// # Summary
    /// Sends a notification to the configured Telegram chat.
    ///
    /// # Logic
    /// 1. Constructs the Telegram API URL.
    /// 2. Formats the message with a bold subject and the content.
    /// 3. Sends a POST request and checks the response status.
    ///
    /// # Returns
    /// * `Ok(())` if the message was sent successfully.
    /// * `Err(NotifyError)` on network errors or a non-success status.
    async fn notify(&self, subject: &str, content: &str) -> Result<(), NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        // Simple formatting: bold subject + newline + content
        let text = format!("*{}*\n{}", subject, content);

        let payload = TelegramMessage {
            chat_id: self.chat_id.clone(),
            text,
            parse_mode: "Markdown".to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(NotifyError::Platform(format!(
                "Telegram API error: {}",
                error_text
            )));
        }

        Ok(())
    }
}
