use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Body of a binary endpoint, yielded chunk by chunk as it arrives.
pub type ByteStream = BoxStream<'static, Result<Bytes, BocaError>>;

#[derive(Debug, Error)]
pub enum BocaError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("failed to encode run metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    /// The bearer token was rejected; the caller has to sign in again.
    AuthExpired,
    Unavailable,
}

#[derive(Clone)]
pub struct BocaClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl BocaClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, BocaError> {
        Ok(Self {
            http: Client::new(),
            base_url: normalize_base(base_url)?,
            token: token.into(),
        })
    }

    /// Same endpoint and connection pool, different bearer token.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn list_contests(&self) -> Result<Vec<Contest>, BocaError> {
        let url = self.endpoint("contest")?;
        self.get_json(url).await
    }

    pub async fn list_problems(&self, contest: u32) -> Result<Vec<Problem>, BocaError> {
        let url = self.endpoint(&format!("contest/{contest}/problem"))?;
        self.get_json(url).await
    }

    pub async fn list_runs(&self, contest: u32, problem: u32) -> Result<Vec<Run>, BocaError> {
        let url = self.endpoint(&format!("contest/{contest}/problem/{problem}/run"))?;
        self.get_json(url).await
    }

    pub async fn list_answers(&self, contest: u32) -> Result<Vec<Answer>, BocaError> {
        let url = self.endpoint(&format!("contest/{contest}/answer"))?;
        self.get_json(url).await
    }

    pub async fn fetch_problem_archive(
        &self,
        contest: u32,
        problem: u32,
    ) -> Result<ByteStream, BocaError> {
        let url = self.endpoint(&format!("contest/{contest}/problem/{problem}/file"))?;
        self.get_stream(url).await
    }

    pub async fn fetch_run_archive(
        &self,
        contest: u32,
        problem: u32,
        run: u32,
    ) -> Result<ByteStream, BocaError> {
        let url = self.endpoint(&format!(
            "contest/{contest}/problem/{problem}/run/{run}/file"
        ))?;
        self.get_stream(url).await
    }

    pub async fn submit_run(
        &self,
        contest: u32,
        problem: u32,
        metadata: &RunSubmission,
        file_name: &str,
        file: Vec<u8>,
    ) -> Result<u32, BocaError> {
        let url = self.endpoint(&format!("contest/{contest}/problem/{problem}/run"))?;
        let form = Form::new()
            .text("data", serde_json::to_string(metadata)?)
            .part("runfile", Part::bytes(file).file_name(file_name.to_string()));
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .multipart(form)
            .send()
            .await?;
        let receipt: RunReceipt = Self::handle_response(response).await?;
        Ok(receipt.runnumber)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, BocaError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn get_stream(&self, url: Url) -> Result<ByteStream, BocaError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.bytes_stream().map_err(BocaError::from).boxed())
    }

    fn auth_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn endpoint(&self, path: &str) -> Result<Url, BocaError> {
        Ok(self.base_url.join(path)?)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BocaError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(BocaError::Api { status, body })
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BocaError> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

impl BocaError {
    pub fn classification(&self) -> ApiErrorClass {
        match self {
            BocaError::Api { status, .. } if *status == StatusCode::UNAUTHORIZED => {
                ApiErrorClass::AuthExpired
            }
            BocaError::Request(err) if err.status() == Some(StatusCode::UNAUTHORIZED) => {
                ApiErrorClass::AuthExpired
            }
            _ => ApiErrorClass::Unavailable,
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        self.classification() == ApiErrorClass::AuthExpired
    }
}

// Relative endpoints must resolve below the configured prefix ("https://host/api").
pub(crate) fn normalize_base(base_url: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Contest {
    pub contestnumber: u32,
    pub contestname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contestmainsite: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conteststartdate: i64,
    #[serde(default)]
    pub contestduration: Option<i64>,
    #[serde(default)]
    pub contestactive: Option<bool>,
    #[serde(default)]
    pub contestmainsiteurl: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Problem {
    pub contestnumber: u32,
    pub problemnumber: u32,
    pub problemname: String,
    #[serde(default)]
    pub problemfullname: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub probleminputfilename: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fake: bool,
    #[serde(default)]
    pub problemcolorname: Option<String>,
    #[serde(default)]
    pub problemcolor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Run {
    #[serde(default, deserialize_with = "null_as_default")]
    pub contestnumber: u32,
    pub runnumber: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub runproblem: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rundate: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub runfilename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub runanswer: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub runanswer1: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub runanswer2: u32,
    #[serde(default)]
    pub usernumber: Option<u32>,
    #[serde(default)]
    pub runsitenumber: Option<u32>,
    #[serde(default)]
    pub runstatus: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Accepted,
    Rejected(u32),
}

impl Verdict {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Pending,
            1 => Self::Accepted,
            other => Self::Rejected(other),
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

impl Run {
    pub fn verdict(&self) -> Verdict {
        Verdict::from_code(self.runanswer)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Answer {
    #[serde(default, deserialize_with = "null_as_default")]
    pub contestnumber: u32,
    pub answernumber: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub runanswer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub yes: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fake: bool,
}

/// Metadata sent in the `data` part of a run submission.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RunSubmission {
    pub runsitenumber: u32,
    pub usernumber: u32,
    pub rundate: i64,
    pub runlangnumber: u32,
    pub rundatediff: i64,
}

#[derive(Debug, Deserialize)]
struct RunReceipt {
    runnumber: u32,
}
