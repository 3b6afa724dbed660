//! Bot control REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use zap_core::{BotControl, Error, Result, TokenSource};

/// Client for the bot control endpoints
#[derive(Clone)]
pub struct ControlClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl ControlClient {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(Error::from)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn bearer(&self) -> Result<String> {
        self.tokens.token().ok_or(Error::Unauthenticated)
    }

    /// Issue a POST to a bot control endpoint and map the response.
    async fn post_action(&self, bot_id: &str, action: &str) -> Result<()> {
        let token = self.bearer()?;
        let url = format!("{}/api/bots/{}/{}", self.base_url, bot_id, action);

        debug!("POST {}", url);

        let response = self.client.post(&url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let err = Error::from_response(response).await;
            if err.invalidates_token() {
                self.tokens.invalidate();
            }
            error!("{} request for bot {} failed: {}", action, bot_id, err);
            return Err(err);
        }

        info!("{} request for bot {} accepted", action, bot_id);
        Ok(())
    }
}

#[async_trait]
impl BotControl for ControlClient {
    async fn start_bot(&self, bot_id: &str) -> Result<()> {
        self.post_action(bot_id, "start").await
    }

    async fn stop_bot(&self, bot_id: &str) -> Result<()> {
        self.post_action(bot_id, "stop").await
    }

    async fn blocked_numbers(&self, bot_id: &str) -> Result<Vec<String>> {
        let token = self.bearer()?;
        let url = format!("{}/api/bots/{}/blocked", self.base_url, bot_id);

        debug!("Fetching blocked numbers for bot {}", bot_id);

        let response = self.client.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let err = Error::from_response(response).await;
            if err.invalidates_token() {
                self.tokens.invalidate();
            }
            return Err(err);
        }

        let numbers: Vec<String> = response.json().await.map_err(Error::from)?;
        debug!("Bot {} has {} blocked numbers", bot_id, numbers.len());
        Ok(numbers)
    }
}
