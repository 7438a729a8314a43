//! GLPI REST API client.
//!
//! Covers the small part of the API the assignment history needs:
//! - Session handshake (`initSession` / `killSession`)
//! - Paginated ticket audit logs (`Ticket/{id}/Log`)
//! - Current group links of a ticket (`Ticket/{id}/Group_Ticket`)

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use ts_core::{
    ActionCode, GroupId, LogEvent, LogSource, TicketId, parse_log_timestamp,
};

const DEFAULT_PAGE_SIZE: u32 = 1000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const ERROR_ITEM_NOT_FOUND: &str = "ERROR_ITEM_NOT_FOUND";
const ERROR_RANGE_EXCEED_TOTAL: &str = "ERROR_RANGE_EXCEED_TOTAL";

/// GLPI client errors.
#[derive(Debug, Error)]
pub enum GlpiError {
    /// The connection settings are unusable.
    #[error("invalid GLPI settings: {reason}")]
    InvalidSettings { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("GLPI error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// The ticket does not exist or is not visible to this session.
    #[error("ticket {0} not found")]
    TicketNotFound(TicketId),
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Connection settings for a GLPI instance.
///
/// Authenticate with either `user_token` or `login` + `password`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlpiSettings {
    /// Base API URL, e.g. `https://glpi.example.org/apirest.php`.
    pub url: String,
    pub app_token: Option<String>,
    pub user_token: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
    /// Proxy URL for all requests.
    pub proxy: Option<String>,
    /// Log entries requested per page.
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl Default for GlpiSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            app_token: None,
            user_token: None,
            login: None,
            password: None,
            proxy: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for GlpiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlpiSettings")
            .field("url", &self.url)
            .field("app_token", &redacted(self.app_token.as_ref()))
            .field("user_token", &redacted(self.user_token.as_ref()))
            .field("login", &self.login)
            .field("password", &redacted(self.password.as_ref()))
            .field("proxy", &redacted(self.proxy.as_ref()))
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn redacted(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[REDACTED]")
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

#[derive(Clone)]
enum Credentials {
    UserToken(String),
    Basic { login: String, password: String },
}

/// An authenticated API session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// How a group is attached to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLinkType {
    Requester,
    Assigned,
    Observer,
    Other(i64),
}

impl From<i64> for GroupLinkType {
    fn from(code: i64) -> Self {
        match code {
            1 => Self::Requester,
            2 => Self::Assigned,
            3 => Self::Observer,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for GroupLinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requester => write!(f, "requester"),
            Self::Assigned => write!(f, "assigned"),
            Self::Observer => write!(f, "observer"),
            Self::Other(code) => write!(f, "type {code}"),
        }
    }
}

/// A group currently linked to a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TicketGroupLink {
    pub group_id: GroupId,
    pub link_type: GroupLinkType,
}

/// GLPI REST client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    app_token: Option<String>,
    credentials: Credentials,
    page_size: usize,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("credentials", &"[REDACTED]")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is blank, no usable credentials are set,
    /// the page size is zero, or the HTTP client fails to build.
    pub fn new(settings: GlpiSettings) -> Result<Self, GlpiError> {
        let base_url = settings.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(GlpiError::InvalidSettings {
                reason: "GLPI URL cannot be empty",
            });
        }
        if settings.page_size == 0 {
            return Err(GlpiError::InvalidSettings {
                reason: "page size must be at least 1",
            });
        }

        let credentials = match (
            non_blank(settings.user_token.as_ref()),
            non_blank(settings.login.as_ref()),
            settings.password.as_ref(),
        ) {
            (Some(token), _, _) => Credentials::UserToken(token.to_string()),
            (None, Some(login), Some(password)) => Credentials::Basic {
                login: login.to_string(),
                password: password.clone(),
            },
            _ => {
                return Err(GlpiError::InvalidSettings {
                    reason: "either a user token or login and password are required",
                });
            }
        };

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(settings.timeout_secs));
        if let Some(proxy) = non_blank(settings.proxy.as_ref()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(GlpiError::ClientBuild)?);
        }
        let http = builder.build().map_err(GlpiError::ClientBuild)?;

        Ok(Self {
            http,
            base_url,
            app_token: non_blank(settings.app_token.as_ref()).map(str::to_string),
            credentials,
            page_size: usize::try_from(settings.page_size).unwrap_or(usize::MAX),
        })
    }

    fn get(&self, path: &str, session: Option<&Session>) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .header(CONTENT_TYPE, "application/json");
        if let Some(app_token) = &self.app_token {
            request = request.header("App-Token", app_token);
        }
        if let Some(session) = session {
            request = request
                .header("Session-Token", &session.token)
                .header("X-GLPI-Sanitized-Content", "false");
        }
        request
    }

    /// Opens a session with the configured credentials.
    pub async fn init_session(&self) -> Result<Session, GlpiError> {
        #[derive(Deserialize)]
        struct InitSessionResponse {
            session_token: String,
        }

        let request = match &self.credentials {
            Credentials::UserToken(token) => self
                .get("initSession", None)
                .header("Authorization", format!("user_token {token}")),
            Credentials::Basic { login, password } => self
                .get("initSession", None)
                .basic_auth(login, Some(password)),
        };
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        let payload: InitSessionResponse = serde_json::from_str(&body)
            .map_err(|err| GlpiError::InvalidResponse(err.to_string()))?;
        tracing::debug!("GLPI session opened");
        Ok(Session::new(payload.session_token))
    }

    /// Closes a session.
    pub async fn kill_session(&self, session: &Session) -> Result<(), GlpiError> {
        let response = self.get("killSession", Some(session)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(api_error(status, &body));
        }
        tracing::debug!("GLPI session closed");
        Ok(())
    }

    /// Fetches a ticket's complete audit log, page by page.
    ///
    /// Entries whose `date_mod` cannot be parsed are dropped with a warning.
    pub async fn fetch_ticket_log(
        &self,
        session: &Session,
        ticket_id: TicketId,
    ) -> Result<Vec<LogEvent>, GlpiError> {
        let path = format!("Ticket/{ticket_id}/Log");
        let mut events = Vec::new();
        let mut start = 0_usize;
        loop {
            let end = start.saturating_add(self.page_size - 1);
            let response = self
                .get(&path, Some(session))
                .query(&[("range", format!("{start}-{end}"))])
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                if error_code(&body).as_deref() == Some(ERROR_RANGE_EXCEED_TOTAL) {
                    break;
                }
                return Err(ticket_error(status, &body, ticket_id));
            }

            let (row_count, page) = parse_page(&body, ticket_id)?;
            events.extend(page);
            if row_count < self.page_size {
                break;
            }
            start = end + 1;
        }
        tracing::debug!(%ticket_id, entries = events.len(), "fetched ticket log");
        Ok(events)
    }

    /// Fetches the groups currently linked to a ticket.
    pub async fn fetch_ticket_groups(
        &self,
        session: &Session,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketGroupLink>, GlpiError> {
        let response = self
            .get(&format!("Ticket/{ticket_id}/Group_Ticket"), Some(session))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ticket_error(status, &body, ticket_id));
        }

        let rows: Vec<RawGroupLink> = unwrap_rows(&body)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let group_id = lenient_int(row.groups_id.as_ref())?;
                let link_type = lenient_int(row.r#type.as_ref()).unwrap_or_default();
                Some(TicketGroupLink {
                    group_id: GroupId::new(group_id),
                    link_type: link_type.into(),
                })
            })
            .collect())
    }
}

/// A [`LogSource`] backed by one open GLPI session.
#[derive(Debug, Clone, Copy)]
pub struct SessionLogSource<'a> {
    client: &'a Client,
    session: &'a Session,
}

impl<'a> SessionLogSource<'a> {
    pub const fn new(client: &'a Client, session: &'a Session) -> Self {
        Self { client, session }
    }
}

impl LogSource for SessionLogSource<'_> {
    type Error = GlpiError;

    fn fetch_ticket_log(
        &self,
        ticket_id: TicketId,
    ) -> impl Future<Output = Result<Vec<LogEvent>, Self::Error>> + Send {
        self.client.fetch_ticket_log(self.session, ticket_id)
    }
}

#[derive(Debug, Deserialize)]
struct RawLogEntry {
    #[serde(default)]
    date_mod: Option<String>,
    #[serde(default)]
    itemtype_link: Option<String>,
    #[serde(default)]
    linked_action: Option<Value>,
    #[serde(default)]
    new_value: Option<Value>,
    #[serde(default)]
    old_value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawGroupLink {
    #[serde(default)]
    groups_id: Option<Value>,
    #[serde(default)]
    r#type: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Rows<T> {
    List(Vec<T>),
    Wrapped { data: Vec<T> },
}

fn unwrap_rows<T: serde::de::DeserializeOwned>(body: &str) -> Result<Vec<T>, GlpiError> {
    match serde_json::from_str::<Rows<T>>(body) {
        Ok(Rows::List(rows) | Rows::Wrapped { data: rows }) => Ok(rows),
        Err(err) => Err(GlpiError::InvalidResponse(err.to_string())),
    }
}

/// Returns the raw row count alongside the entries that survived parsing.
///
/// A page is either a bare list of entries or an object with a `data` list.
fn parse_page(body: &str, ticket_id: TicketId) -> Result<(usize, Vec<LogEvent>), GlpiError> {
    let rows: Vec<RawLogEntry> = unwrap_rows(body)?;
    let row_count = rows.len();
    let events = rows
        .into_iter()
        .filter_map(|row| log_event_from_raw(row, ticket_id))
        .collect();
    Ok((row_count, events))
}

fn log_event_from_raw(row: RawLogEntry, ticket_id: TicketId) -> Option<LogEvent> {
    let raw_date = row.date_mod.unwrap_or_default();
    let timestamp = match parse_log_timestamp(&raw_date) {
        Ok(timestamp) => timestamp,
        Err(err) => {
            tracing::warn!(%ticket_id, %err, "dropping log entry with unreadable date");
            return None;
        }
    };
    Some(LogEvent {
        timestamp,
        linked_entity_type: row.itemtype_link.unwrap_or_default(),
        action: ActionCode::from(lenient_int(row.linked_action.as_ref()).unwrap_or_default()),
        new_value: lenient_text(row.new_value),
        old_value: lenient_text(row.old_value),
    })
}

/// GLPI serializes numeric columns as either numbers or strings.
fn lenient_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_text(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// GLPI errors come as `["ERROR_CODE", "message"]`.
fn parse_api_error(body: &str) -> Option<(String, String)> {
    let mut parts = serde_json::from_str::<Vec<String>>(body).ok()?.into_iter();
    let code = parts.next()?;
    let message = parts.next().unwrap_or_default();
    Some((code, message))
}

fn error_code(body: &str) -> Option<String> {
    parse_api_error(body).map(|(code, _)| code)
}

fn api_error(status: StatusCode, body: &str) -> GlpiError {
    let message = match parse_api_error(body) {
        Some((code, message)) if message.is_empty() => code,
        Some((code, message)) => format!("{code}: {message}"),
        None => body.to_string(),
    };
    GlpiError::Api {
        status: status.as_u16(),
        message,
    }
}

fn ticket_error(status: StatusCode, body: &str, ticket_id: TicketId) -> GlpiError {
    if status == StatusCode::NOT_FOUND || error_code(body).as_deref() == Some(ERROR_ITEM_NOT_FOUND)
    {
        return GlpiError::TicketNotFound(ticket_id);
    }
    api_error(status, body)
}
