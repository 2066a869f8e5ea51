//! Short-lived tokens for the realtime endpoint

use crate::{ReadalongError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub trait CredentialIssuer: Send + Sync {
    fn issue(&self) -> BoxFuture<'_, Result<String>>;
}

/// Token from an issuer response: `value` or `client_secret.value`
pub fn extract_token(body: &Value) -> Option<String> {
    body.get("value")
        .and_then(Value::as_str)
        .or_else(|| {
            body.get("client_secret")
                .and_then(|s| s.get("value"))
                .and_then(Value::as_str)
        })
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Issuer backed by an HTTP endpoint answering `POST` with a JSON body
pub struct HttpCredentialIssuer {
    client: reqwest::Client,
    url: String,
    authorization: Option<String>,
}

impl HttpCredentialIssuer {
    pub fn new(url: impl Into<String>, authorization: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ReadalongError::CredentialError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            authorization,
        })
    }

    async fn fetch(&self) -> Result<String> {
        debug!("Requesting realtime token from {}", self.url);
        let mut request = self.client.post(&self.url).json(&serde_json::json!({}));
        if let Some(auth) = &self.authorization {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ReadalongError::CredentialError(format!("Token request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReadalongError::CredentialError(format!(
                "Token endpoint returned {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ReadalongError::CredentialError(format!("Invalid token response: {}", e)))?;
        let token = extract_token(&body).ok_or_else(|| {
            ReadalongError::CredentialError("No token in credential response".into())
        })?;
        info!("Obtained realtime token");
        Ok(token)
    }
}

impl CredentialIssuer for HttpCredentialIssuer {
    fn issue(&self) -> BoxFuture<'_, Result<String>> {
        self.fetch().boxed()
    }
}

/// A fixed token, e.g. from the environment
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialIssuer for StaticCredential {
    fn issue(&self) -> BoxFuture<'_, Result<String>> {
        let token = self.0.clone();
        async move {
            if token.is_empty() {
                Err(ReadalongError::CredentialError("Empty token".into()))
            } else {
                Ok(token)
            }
        }
        .boxed()
    }
}
