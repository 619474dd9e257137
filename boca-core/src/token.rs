use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::client::normalize_base;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("token response carried no access token")]
    EmptyToken,
}

/// Exchanges a user name and an already salted credential digest for a bearer token.
#[derive(Clone)]
pub struct TokenClient {
    http: Client,
    base_url: Url,
}

impl TokenClient {
    pub fn new(base_url: &str) -> Result<Self, TokenError> {
        Ok(Self {
            http: Client::new(),
            base_url: normalize_base(base_url)?,
        })
    }

    pub async fn request_token(&self, name: &str, credential: &str) -> Result<String, TokenError> {
        let mut url = self.base_url.join("token")?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("password", credential);

        let response = self.http.get(url).send().await?;
        if response.status().is_success() {
            let token = response.json::<TokenResponse>().await?;
            token
                .access_token
                .filter(|t| !t.is_empty())
                .ok_or(TokenError::EmptyToken)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(TokenError::Api { status, body })
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(rename = "accessToken", default)]
    access_token: Option<String>,
}
