//! vCenter REST task source
//!
//! Fetches task records for a time window via the vCenter REST API:
//! a session is created with basic auth, then task pages are read until an
//! empty page comes back. Per-page errors are retried a bounded number of
//! times; a page that keeps failing ends the fetch with whatever was
//! accumulated so far. Malformed records are skipped with a warning.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{task_id_from_key, ReasonKind, TaskRecord, TaskState};

const SESSION_HEADER: &str = "vmware-api-session-id";
const PAGE_SIZE: usize = 1000;
const PAGE_RETRIES: u32 = 3;

/// Custom error type for vSphere API operations.
#[derive(Debug, thiserror::Error)]
pub enum VsphereError {
    #[error("Authentication failed (401). Check username and password")]
    AuthFailed,
    #[error("Permission denied (403). The account may lack task read privileges")]
    PermissionDenied,
    #[error("vSphere API error (HTTP {status}): {message}")]
    HttpError { status: u16, message: String },
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// Time window for a task query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFilter {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeFilter {
    /// Window reaching `hours` back from now. With `duration_hours` set, the
    /// window ends `duration_hours` after its begin instead of at now.
    pub fn look_back(hours: i64, duration_hours: Option<i64>) -> Self {
        let now = Utc::now();
        let begin = now - Duration::hours(hours);
        let end = match duration_hours {
            Some(duration) => begin + Duration::hours(duration),
            None => now,
        };
        TimeFilter { begin, end }
    }
}

/// TLS options for the client. Certificate verification is only ever
/// disabled through this explicit option, never process-wide ambient state.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsOptions {
    pub accept_invalid_certs: bool,
}

/// Server credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SessionResponse {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TaskPage {
    value: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
    key: String,
    start_time: String,
    complete_time: Option<String>,
    state: String,
    entity_name: Option<String>,
    description_id: Option<String>,
    reason: Option<RawReason>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReason {
    #[serde(rename = "type")]
    kind: Option<String>,
    schedule_name: Option<String>,
    user_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct PageQuery<'a> {
    begin: &'a str,
    end: &'a str,
    page: usize,
    page_size: usize,
}

impl RawTask {
    fn into_record(self) -> anyhow::Result<TaskRecord> {
        let start_time = DateTime::parse_from_rfc3339(&self.start_time)?;
        let complete_time = self
            .complete_time
            .as_deref()
            .map(DateTime::parse_from_rfc3339)
            .transpose()?;

        Ok(TaskRecord {
            id: task_id_from_key(&self.key),
            start_time,
            complete_time,
            state: TaskState::from(self.state),
            entity_name: self.entity_name.unwrap_or_default(),
            description_id: self.description_id.unwrap_or_default(),
            reason: self.reason.map(RawReason::into_kind).unwrap_or_default(),
        })
    }
}

impl RawReason {
    fn into_kind(self) -> ReasonKind {
        match self.kind.as_deref() {
            Some("TaskReasonSchedule") => ReasonKind::Scheduled {
                schedule_name: self.schedule_name.unwrap_or_default(),
            },
            Some("TaskReasonUser") => ReasonKind::User {
                user_name: self.user_name.unwrap_or_default(),
            },
            _ => ReasonKind::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// vCenter REST API client.
pub struct VsphereClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl std::fmt::Debug for VsphereClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Normalize a host into a base URL: ensure a scheme, strip trailing
/// slashes.
fn normalize_host(host: &str) -> String {
    let with_scheme = if host.starts_with("https://") || host.starts_with("http://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

impl VsphereClient {
    pub fn new(
        host: &str,
        credentials: Credentials,
        tls: TlsOptions,
    ) -> Result<Self, VsphereError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(tls.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/rest", normalize_host(host)),
            credentials,
        })
    }

    async fn create_session(&self) -> Result<String, VsphereError> {
        let url = format!("{}/com/vmware/cis/session", self.base_url);
        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => VsphereError::AuthFailed,
                403 => VsphereError::PermissionDenied,
                code => VsphereError::HttpError {
                    status: code,
                    message: body,
                },
            });
        }

        let session: SessionResponse = resp.json().await?;
        Ok(session.value)
    }

    async fn fetch_page(
        &self,
        session: &str,
        filter: &TimeFilter,
        page: usize,
    ) -> Result<Vec<RawTask>, VsphereError> {
        let url = format!("{}/cis/tasks", self.base_url);
        let begin = filter.begin.to_rfc3339();
        let end = filter.end.to_rfc3339();
        let query = PageQuery {
            begin: &begin,
            end: &end,
            page,
            page_size: PAGE_SIZE,
        };
        let resp = self
            .client
            .get(&url)
            .header(SESSION_HEADER, session)
            .query(&query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VsphereError::HttpError {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: TaskPage = resp.json().await?;
        Ok(parsed.value)
    }

    /// Fetch all task records within the window.
    ///
    /// Pages until the server returns an empty page. A page that still
    /// fails after retries ends the fetch; whatever was accumulated is
    /// returned rather than raised.
    pub async fn fetch(&self, filter: &TimeFilter) -> Result<Vec<TaskRecord>, VsphereError> {
        let session = self.create_session().await?;

        let mut records = Vec::new();
        let mut page = 0usize;
        loop {
            let mut attempts = 0u32;
            let raw = loop {
                match self.fetch_page(&session, filter, page).await {
                    Ok(raw) => break raw,
                    Err(e) if attempts < PAGE_RETRIES => {
                        attempts += 1;
                        warn!("Task page {} failed (attempt {}): {}", page, attempts, e);
                    }
                    Err(e) => {
                        warn!(
                            "Giving up on task page {}, returning {} record(s): {}",
                            page,
                            records.len(),
                            e
                        );
                        return Ok(records);
                    }
                }
            };

            if raw.is_empty() {
                break;
            }
            for item in raw {
                let key = item.key.clone();
                match item.into_record() {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping malformed task record {}: {}", key, e),
                }
            }
            page += 1;
        }

        Ok(records)
    }
}
