//! Discord REST client implementing [`ChatSession`].

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Method, Response, StatusCode};
use tracing::{debug, info, warn};

use super::model::{ApiError, Message, RateLimited, User};
use crate::chat::ChatSession;
use crate::config::SecretString;
use crate::error::ChatError;
use crate::message::MessageSnapshot;

/// Discord REST API base (v10).
pub const DEFAULT_DISCORD_API_URL: &str = "https://discord.com/api/v10";

/// Upper bound on a server-requested rate limit wait.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);

/// Discord REST client.
///
/// The bot user id is learned once, from the gateway `READY` event or from
/// `GET /users/@me`, and cached for the process lifetime.
///
/// # Rate limits
///
/// A 429 response is retried once after the `retry_after` the server asks
/// for (capped at 10s). A second 429 is returned as an error.
pub struct DiscordClient {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
    bot_user_id: OnceLock<String>,
}

impl DiscordClient {
    pub fn new(client: reqwest::Client, token: SecretString) -> Self {
        Self::with_base_url(client, token, DEFAULT_DISCORD_API_URL)
    }

    pub fn with_base_url(
        client: reqwest::Client,
        token: SecretString,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_user_id: OnceLock::new(),
        }
    }

    /// Record the bot's user id. Later calls with a different id are ignored.
    pub fn set_bot_user_id(&self, id: impl Into<String>) {
        let id = id.into();
        if self.bot_user_id.set(id.clone()).is_err()
            && self.bot_user_id.get().is_some_and(|known| *known != id)
        {
            warn!(new_id = %id, "Bot user id already known, ignoring a different one");
        }
    }

    /// Resolve the bot identity through `GET /users/@me` and cache it.
    pub async fn resolve_identity(&self) -> Result<String, ChatError> {
        if let Some(id) = self.bot_user_id.get() {
            return Ok(id.clone());
        }

        let response = self.execute(Method::GET, "/users/@me").await?;
        let user: User = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidPayload(e.to_string()))?;

        info!(bot_id = %user.id, username = %user.username, "Resolved bot identity");
        self.set_bot_user_id(user.id);
        self.bot_user_id
            .get()
            .cloned()
            .ok_or_else(|| ChatError::InvalidPayload("bot identity not recorded".to_string()))
    }

    /// Send an authenticated request, retrying once on 429.
    async fn execute(&self, method: Method, path: &str) -> Result<Response, ChatError> {
        let url = format!("{}{}", self.base_url, path);
        let mut rate_limited = false;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bot {}", self.token.expose()));
            if method == Method::PUT {
                request = request.header(CONTENT_LENGTH, 0);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ChatError::RequestFailed(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS && !rate_limited {
                rate_limited = true;
                let wait = response
                    .json::<RateLimited>()
                    .await
                    .ok()
                    .map(|r| rate_limit_wait(r.retry_after))
                    .unwrap_or(Duration::from_secs(1));
                warn!(
                    path = %path,
                    wait_ms = wait.as_millis(),
                    "Discord rate limit hit, retrying once"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return Err(api_error(status, response).await);
        }
    }
}

/// Wait requested by a 429 body, clamped to `0..=MAX_RATE_LIMIT_WAIT`.
///
/// Values that are not a valid number of seconds wait the maximum.
fn rate_limit_wait(retry_after: f64) -> Duration {
    let secs = retry_after.clamp(0.0, MAX_RATE_LIMIT_WAIT.as_secs_f64());
    Duration::try_from_secs_f64(secs).unwrap_or(MAX_RATE_LIMIT_WAIT)
}

async fn api_error(status: StatusCode, response: Response) -> ChatError {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|e| e.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or(body);
    ChatError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ChatSession for DiscordClient {
    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessageSnapshot, ChatError> {
        let path = format!("/channels/{}/messages/{}", channel_id, message_id);
        let response = self.execute(Method::GET, &path).await?;
        let message: Message = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidPayload(e.to_string()))?;
        debug!(
            message_id = %message.id,
            reactions = message.reactions.len(),
            "Fetched message"
        );
        Ok(message.into())
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let path = format!(
            "/channels/{}/messages/{}/reactions/{}/@me",
            channel_id,
            message_id,
            urlencoding::encode(emoji)
        );
        self.execute(Method::PUT, &path).await?;
        Ok(())
    }

    fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.get().cloned()
    }
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token)
            .field("bot_user_id", &self.bot_user_id.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DiscordClient {
        DiscordClient::new(
            reqwest::Client::new(),
            SecretString::new("very-secret-token".to_string()),
        )
    }

    #[test]
    fn bot_id_is_set_once() {
        let client = client();
        assert!(client.bot_user_id().is_none());

        client.set_bot_user_id("111");
        client.set_bot_user_id("222");
        assert_eq!(client.bot_user_id().as_deref(), Some("111"));
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("DiscordClient"));
        assert!(!debug.contains("very-secret-token"));
    }

    #[test]
    fn rate_limit_wait_is_clamped() {
        assert_eq!(rate_limit_wait(0.5), Duration::from_millis(500));
        assert_eq!(rate_limit_wait(-3.0), Duration::ZERO);
        assert_eq!(rate_limit_wait(1e300), MAX_RATE_LIMIT_WAIT);
        assert_eq!(rate_limit_wait(f64::INFINITY), MAX_RATE_LIMIT_WAIT);
        assert_eq!(rate_limit_wait(f64::NAN), MAX_RATE_LIMIT_WAIT);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = DiscordClient::with_base_url(
            reqwest::Client::new(),
            SecretString::new("t".to_string()),
            "http://localhost:1234/api/",
        );
        assert_eq!(client.base_url, "http://localhost:1234/api");
    }
}
