use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::models::snapshot::Snapshot;
use crate::sync::{RemoteFile, RemoteStore, SyncError};

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

const GOOGLE_API_ROOT: &str = "https://www.googleapis.com";
const FILE_FIELDS: &str = "id,name,modifiedTime";
const MULTIPART_BOUNDARY: &str = "casey-rides-backup-boundary";

/// ---------------------------------------------------------------------------
/// API Data Structures
/// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FileList {
  #[serde(default)]
  files: Vec<RemoteFile>,
}

/// ---------------------------------------------------------------------------
/// Client
/// ---------------------------------------------------------------------------

/// Google Drive backup file access (drive.file scope)
#[derive(Debug, Clone)]
pub struct DriveClient {
  client: Client,
  api_root: String,
}

impl DriveClient {
  pub fn new(timeout: Duration) -> Result<Self, SyncError> {
    Self::with_api_root(timeout, GOOGLE_API_ROOT)
  }

  pub fn with_api_root(timeout: Duration, api_root: &str) -> Result<Self, SyncError> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| SyncError::Request(e.to_string()))?;
    Ok(Self {
      client,
      api_root: api_root.trim_end_matches('/').to_string(),
    })
  }

  fn url(&self, path: &str) -> Result<Url, SyncError> {
    Url::parse(&format!("{}{}", self.api_root, path)).map_err(|e| SyncError::Request(e.to_string()))
  }

  fn pretty(snapshot: &Snapshot) -> Result<String, SyncError> {
    snapshot
      .to_pretty_json()
      .map_err(|e| SyncError::Decode(e.to_string()))
  }
}

fn request_error(err: reqwest::Error) -> SyncError {
  if err.is_connect() {
    SyncError::Offline
  } else {
    SyncError::Request(err.to_string())
  }
}

/// Map the status of a Drive response; `context` names the failed step
fn check_status(response: Response, context: &'static str) -> Result<Response, SyncError> {
  match response.status() {
    StatusCode::UNAUTHORIZED => Err(SyncError::Unauthorized),
    StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimited),
    status if !status.is_success() => Err(SyncError::Http {
      status: status.as_u16(),
      context,
    }),
    _ => Ok(response),
  }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, SyncError> {
  let body = response.text().await.map_err(request_error)?;
  serde_json::from_str(&body).map_err(|e| SyncError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteStore for DriveClient {
  fn display_name(&self) -> &str {
    "Google Drive"
  }

  async fn find_by_name(&self, token: &str, name: &str) -> Result<Option<RemoteFile>, SyncError> {
    let mut url = self.url("/drive/v3/files")?;
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    url
      .query_pairs_mut()
      .append_pair("q", &format!("name='{}' and trashed=false", escaped))
      .append_pair("fields", &format!("files({})", FILE_FIELDS));

    let response = self
      .client
      .get(url)
      .bearer_auth(token)
      .send()
      .await
      .map_err(request_error)?;
    let list: FileList = decode(check_status(response, "Drive API")?).await?;

    Ok(list.files.into_iter().next())
  }

  async fn download(&self, token: &str, file_id: &str) -> Result<Snapshot, SyncError> {
    let mut url = self.url(&format!("/drive/v3/files/{}", file_id))?;
    url.query_pairs_mut().append_pair("alt", "media");

    let response = self
      .client
      .get(url)
      .bearer_auth(token)
      .send()
      .await
      .map_err(request_error)?;

    decode(check_status(response, "Download")?).await
  }

  async fn create(&self, token: &str, name: &str, snapshot: &Snapshot) -> Result<RemoteFile, SyncError> {
    let mut url = self.url("/upload/drive/v3/files")?;
    url
      .query_pairs_mut()
      .append_pair("uploadType", "multipart")
      .append_pair("fields", FILE_FIELDS);

    let metadata = serde_json::json!({ "name": name, "mimeType": "application/json" });
    let body = format!(
      "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n\
       --{b}\r\nContent-Type: application/json\r\n\r\n{data}\r\n--{b}--\r\n",
      b = MULTIPART_BOUNDARY,
      meta = metadata,
      data = Self::pretty(snapshot)?,
    );

    let response = self
      .client
      .post(url)
      .bearer_auth(token)
      .header(
        reqwest::header::CONTENT_TYPE,
        format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
      )
      .body(body)
      .send()
      .await
      .map_err(request_error)?;

    let file: RemoteFile = decode(check_status(response, "Upload")?).await?;
    tracing::info!(file_id = %file.id, "Backup file created");
    Ok(file)
  }

  async fn update(&self, token: &str, file_id: &str, snapshot: &Snapshot) -> Result<RemoteFile, SyncError> {
    let mut url = self.url(&format!("/upload/drive/v3/files/{}", file_id))?;
    url
      .query_pairs_mut()
      .append_pair("uploadType", "media")
      .append_pair("fields", FILE_FIELDS);

    let response = self
      .client
      .patch(url)
      .bearer_auth(token)
      .header(reqwest::header::CONTENT_TYPE, "application/json")
      .body(Self::pretty(snapshot)?)
      .send()
      .await
      .map_err(request_error)?;

    decode(check_status(response, "Update")?).await
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
