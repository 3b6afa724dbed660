//! Identity provider REST client

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use zap_core::{Error, Result, TokenSource};

use crate::token::TokenStore;

/// An issued session: the bearer token plus its refresh handle.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds until `id_token` expires
    pub expires_in_secs: u64,
}

/// Identity provider client
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(Error::from)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange credentials for a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = format!("{}/v1/token", self.base_url);

        let body = serde_json::json!({
            "grant_type": "password",
            "email": email,
            "password": password,
        });

        debug!("Signing in as {}", email);

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let err = Error::from_response(response).await;
            error!("Sign-in failed: {}", err);
            return Err(err);
        }

        let session: Session = response.json().await.map_err(Error::from)?;
        info!("Signed in, token expires in {}s", session.expires_in_secs);
        Ok(session)
    }

    /// Trade a refresh token for a fresh session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        let url = format!("{}/v1/token", self.base_url);

        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let err = Error::from_response(response).await;
            error!("Token refresh failed: {}", err);
            return Err(err);
        }

        let session: Session = response.json().await.map_err(Error::from)?;
        debug!("Token refreshed, expires in {}s", session.expires_in_secs);
        Ok(session)
    }
}

/// Keep the token store fresh on a fixed interval.
///
/// Provider tokens expire after an hour; the default interval refreshes
/// well ahead of that. A failed refresh clears the stale token so the
/// next user action surfaces an authentication error instead of a 401.
pub fn spawn_refresh_task(
    client: IdentityClient,
    store: Arc<TokenStore>,
    mut session: Session,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately

        loop {
            ticker.tick().await;

            match client.refresh(&session.refresh_token).await {
                Ok(fresh) => {
                    store.set(fresh.id_token.clone());
                    session = fresh;
                }
                Err(e) => {
                    error!("Periodic token refresh failed: {}", e);
                    store.invalidate();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = IdentityClient::new("http://localhost:9099/");
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url, "http://localhost:9099");
    }

    #[test]
    fn test_session_deserialization() {
        let json = r#"{"id_token":"abc","refresh_token":"def","expires_in_secs":3600}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.id_token, "abc");
        assert_eq!(session.expires_in_secs, 3600);
    }
}
