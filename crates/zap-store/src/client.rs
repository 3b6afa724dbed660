//! Document store REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use zap_core::{BotRecord, BotStore, Error, Result, TokenSource};

/// Client for the bot document collection
#[derive(Clone)]
pub struct StoreClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl StoreClient {
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

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let err = Error::from_response(response).await;
        if err.invalidates_token() {
            self.tokens.invalidate();
        }
        Err(err)
    }

    /// List the bots owned by a user.
    pub async fn list_bots(&self, user_id: &str) -> Result<Vec<BotRecord>> {
        let token = self.bearer()?;
        let url = format!("{}/v1/bots", self.base_url);

        debug!("Listing bots for user {}", user_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let response = self.check(response).await?;

        let bots: Vec<BotRecord> = response.json().await.map_err(Error::from)?;
        debug!("Fetched {} bots", bots.len());
        Ok(bots)
    }

    /// Create a new bot document. A fresh id is assigned when the record
    /// carries an empty one.
    pub async fn create_bot(&self, mut record: BotRecord) -> Result<BotRecord> {
        let token = self.bearer()?;

        if record.id.is_empty() {
            record.id = uuid::Uuid::new_v4().to_string();
        }
        let url = format!("{}/v1/bots/{}", self.base_url, record.id);

        debug!("Creating bot {} ({})", record.name, record.id);

        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .json(&record)
            .send()
            .await?;
        self.check(response).await?;

        info!("Created bot {}", record.id);
        Ok(record)
    }

    /// Delete a bot document.
    pub async fn delete_bot(&self, bot_id: &str) -> Result<()> {
        let token = self.bearer()?;
        let url = format!("{}/v1/bots/{}", self.base_url, bot_id);

        let response = self.client.delete(&url).bearer_auth(token).send().await?;
        self.check(response).await?;

        info!("Deleted bot {}", bot_id);
        Ok(())
    }

    /// The explicit save action: persist the client-owned system message.
    pub async fn update_system_message(&self, bot_id: &str, text: &str) -> Result<()> {
        self.update(bot_id, serde_json::json!({ "system_message": text }))
            .await
    }
}

#[async_trait]
impl BotStore for StoreClient {
    async fn get(&self, bot_id: &str) -> Result<BotRecord> {
        let token = self.bearer()?;
        let url = format!("{}/v1/bots/{}", self.base_url, bot_id);

        debug!("Fetching bot record {}", bot_id);

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let response = self.check(response).await?;

        let record: BotRecord = response.json().await.map_err(Error::from)?;
        Ok(record)
    }

    async fn update(&self, bot_id: &str, fields: serde_json::Value) -> Result<()> {
        let token = self.bearer()?;
        let url = format!("{}/v1/bots/{}", self.base_url, bot_id);

        debug!("Updating bot record {}: {}", bot_id, fields);

        let response = self
            .client
            .patch(&url)
            .bearer_auth(token)
            .json(&fields)
            .send()
            .await?;

        if let Err(e) = self.check(response).await {
            error!("Update of bot {} failed: {}", bot_id, e);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoToken;

    impl TokenSource for NoToken {
        fn token(&self) -> Option<String> {
            None
        }
        fn invalidate(&self) {}
    }

    #[test]
    fn test_client_creation_trims_slash() {
        let client = StoreClient::new("http://localhost:8080/", Arc::new(NoToken)).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_get_without_token_fails_locally() {
        // Unreachable host on purpose: a missing token must fail before
        // any network call is attempted.
        let client = StoreClient::new("http://192.0.2.1:1", Arc::new(NoToken)).unwrap();
        let result = client.get("acme").await;
        assert!(matches!(result, Err(Error::Unauthenticated)));
    }
}
