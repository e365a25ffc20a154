//! Progress persistence API contract and its HTTP client.

use crate::autosave::record::{ProgressRecord, ProgressUpdate, SubjectId};
use crate::error::{BoardError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Header carrying the user whose progress is read or written.
pub const USER_HEADER: &str = "x-user-id";

/// Where the autosave controller reads and writes progress.
#[async_trait]
pub trait ProgressApi: Send + Sync {
    /// Current record for `subject`, or `None` if nothing was saved yet.
    async fn get(&self, subject: SubjectId) -> Result<Option<ProgressRecord>>;

    /// Apply a partial update and return the resulting record.
    async fn put(&self, subject: SubjectId, update: &ProgressUpdate) -> Result<ProgressRecord>;
}

/// JSON-over-HTTP client for `GET/PUT {base}/progress/{subject}`.
#[derive(Debug, Clone)]
pub struct HttpProgressApi {
    client: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
}

impl HttpProgressApi {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BoardError::Progress(format!("cannot build progress client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            user_id: None,
        })
    }

    /// Send requests on behalf of `user_id`.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn url(&self, subject: SubjectId) -> String {
        format!("{}/progress/{subject}", self.base_url)
    }

    fn with_user_header(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.user_id {
            Some(user) => request.header(USER_HEADER, user),
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(BoardError::Progress(format!("progress API responded with {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| BoardError::Progress(format!("cannot decode progress response: {e}")))
    }
}

#[async_trait]
impl ProgressApi for HttpProgressApi {
    async fn get(&self, subject: SubjectId) -> Result<Option<ProgressRecord>> {
        let request = self.with_user_header(self.client.get(self.url(subject)));
        let response = request
            .send()
            .await
            .map_err(|e| BoardError::Progress(format!("progress request failed: {e}")))?;
        Self::read_json(response).await
    }

    async fn put(&self, subject: SubjectId, update: &ProgressUpdate) -> Result<ProgressRecord> {
        let request = self.with_user_header(self.client.put(self.url(subject)).json(update));
        let response = request
            .send()
            .await
            .map_err(|e| BoardError::Progress(format!("progress request failed: {e}")))?;
        Self::read_json(response).await
    }
}
