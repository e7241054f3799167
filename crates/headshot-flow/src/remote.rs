//! Remote image-storage and contact-creation boundaries.

use crate::contact::ContactDraft;
use base64::{engine::general_purpose, Engine as _};
use headshot_core::{HandleError, ImageHandle};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("could not read photo: {0}")]
    Photo(#[from] HandleError),
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Image upload body: base64 content plus declared type and name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub content: String,
    pub mime_type: String,
    pub file_name: String,
}

impl UploadRequest {
    pub async fn from_handle(handle: &ImageHandle) -> Result<Self, RemoteError> {
        let bytes = handle.read_bytes().await?;
        Ok(Self {
            content: general_purpose::STANDARD.encode(bytes),
            mime_type: handle.mime_type(),
            file_name: handle.file_name(),
        })
    }
}

/// Contact creation body in the backend's vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub group: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ContactPayload {
    pub fn from_draft(draft: &ContactDraft, photo_url: Option<String>) -> Self {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            name: draft.name.trim().to_string(),
            hint: non_empty(&draft.hint),
            summary: non_empty(&draft.summary),
            group: draft.category.backend_name().to_string(),
            tags: draft.tags.clone(),
            photo_url,
        }
    }
}

/// Acknowledgment of a created contact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContactAck {
    pub id: String,
}

pub trait ImageStore: Send + Sync {
    /// Store an image and return its durable URL.
    fn upload(&self, request: UploadRequest) -> impl Future<Output = Result<String, RemoteError>> + Send;
}

pub trait ContactApi: Send + Sync {
    fn create(&self, payload: ContactPayload) -> impl Future<Output = Result<ContactAck, RemoteError>> + Send;
}

/// Upload the draft's photo (if any), then create the contact.
pub async fn create_with_photo<S, C>(
    store: &S,
    api: &C,
    draft: &ContactDraft,
) -> Result<ContactAck, RemoteError>
where
    S: ImageStore,
    C: ContactApi,
{
    let photo_url = match &draft.photo {
        Some(photo) => {
            let request = UploadRequest::from_handle(photo).await?;
            let url = store.upload(request).await?;
            tracing::debug!(%url, "photo uploaded");
            Some(url)
        }
        None => None,
    };
    api.create(ContactPayload::from_draft(draft, photo_url)).await
}

#[derive(Deserialize)]
struct UploadResponse {
    url: String,
}

/// reqwest client for the contact backend.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, RemoteError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| RemoteError::Rejected(format!("invalid API token: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + Sync,
        R: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

impl ImageStore for HttpRemote {
    async fn upload(&self, request: UploadRequest) -> Result<String, RemoteError> {
        let response: UploadResponse = self.post_json("images", &request).await?;
        Ok(response.url)
    }
}

impl ContactApi for HttpRemote {
    async fn create(&self, payload: ContactPayload) -> Result<ContactAck, RemoteError> {
        self.post_json("contacts", &payload).await
    }
}
