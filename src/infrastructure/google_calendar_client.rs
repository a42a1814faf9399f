use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::GoogleCalendarEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

#[derive(Debug, Clone)]
pub struct ListEventsRequest {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
}

#[async_trait]
pub trait GoogleCalendarClient: Send + Sync {
    /// Probes `users/me/calendarList`; used to detect an expired session.
    async fn check_access(&self, access_token: &str) -> Result<(), InfraError>;

    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError>;

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError>;

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<(), InfraError>;

    /// A remote `410 Gone` counts as success: the event is already absent.
    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
    api_base: String,
}

impl Default for ReqwestGoogleCalendarClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestGoogleCalendarClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            api_base: CALENDAR_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Validation(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = Url::parse(&self.api_base).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid calendar api base url: {error}"))
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("calendar api base URL cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn events_endpoint(&self, calendar_id: &str) -> Result<Url, InfraError> {
        self.endpoint(&["calendars", calendar_id, "events"])
    }

    fn event_endpoint(&self, calendar_id: &str, event_id: &str) -> Result<Url, InfraError> {
        self.endpoint(&["calendars", calendar_id, "events", event_id])
    }

    async fn read_body(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!("failed reading {operation} response: {error}"))
        })?;
        Ok((status, body))
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorEnvelope {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// Maps a non-success response to the error taxonomy: 401 is an
/// authentication failure, everything else carries the server message when
/// the body has one.
pub fn api_error(status: StatusCode, body: &str, fallback: &str) -> InfraError {
    let server_message = serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty());

    if status == StatusCode::UNAUTHORIZED {
        return InfraError::Authentication(
            server_message.unwrap_or_else(|| "http 401".to_string()),
        );
    }
    InfraError::Http {
        status: status.as_u16(),
        message: server_message.unwrap_or_else(|| fallback.to_string()),
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct CreatedEventResponse {
    id: Option<String>,
}

#[async_trait]
impl GoogleCalendarClient for ReqwestGoogleCalendarClient {
    async fn check_access(&self, access_token: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        let endpoint = self.endpoint(&["users", "me", "calendarList"])?;
        let response = self
            .client
            .get(endpoint)
            .query(&[("maxResults", "1")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| {
                InfraError::Network(format!("network error while checking calendar access: {error}"))
            })?;

        let (status, body) = Self::read_body(response, "calendar list").await?;
        if !status.is_success() {
            return Err(api_error(status, &body, "Failed to verify calendar access"));
        }
        Ok(())
    }

    async fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        request: ListEventsRequest,
    ) -> Result<Vec<GoogleCalendarEvent>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = self.events_endpoint(calendar_id)?;
        let mut page_token: Option<String> = None;
        let mut events = Vec::new();

        loop {
            let mut req = self
                .client
                .get(endpoint.clone())
                .bearer_auth(access_token)
                .query(&[
                    ("timeMin", request.time_min.to_rfc3339()),
                    ("timeMax", request.time_max.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                ]);
            if let Some(page_token) = page_token.as_deref() {
                req = req.query(&[("pageToken", page_token)]);
            }

            let response = req.send().await.map_err(|error| {
                InfraError::Network(format!("network error while listing calendar events: {error}"))
            })?;
            let (status, body) = Self::read_body(response, "events list").await?;
            if !status.is_success() {
                return Err(api_error(status, &body, "Failed to fetch events"));
            }

            let mut parsed: EventsPageResponse = serde_json::from_str(&body)?;
            events.extend(parsed.items.take().unwrap_or_default());

            match parsed.next_page_token.take() {
                Some(next_page_token) => page_token = Some(next_page_token),
                None => break,
            }
        }

        Ok(events)
    }

    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<String, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;

        let endpoint = self.events_endpoint(calendar_id)?;
        let response = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|error| {
                InfraError::Network(format!("network error while creating event: {error}"))
            })?;

        let (status, body) = Self::read_body(response, "event create").await?;
        if !status.is_success() {
            return Err(api_error(status, &body, "Failed to create event"));
        }

        let parsed: CreatedEventResponse = serde_json::from_str(&body)?;
        parsed
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::Http {
                status: status.as_u16(),
                message: "event create response did not include id".to_string(),
            })
    }

    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GoogleCalendarEvent,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;
        Self::ensure_non_empty(event_id, "event id")?;

        let endpoint = self.event_endpoint(calendar_id, event_id)?;
        let response = self
            .client
            .put(endpoint)
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await
            .map_err(|error| {
                InfraError::Network(format!("network error while updating event: {error}"))
            })?;

        let (status, body) = Self::read_body(response, "event update").await?;
        if !status.is_success() {
            return Err(api_error(status, &body, "Failed to update event"));
        }
        Ok(())
    }

    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(calendar_id, "calendar id")?;
        Self::ensure_non_empty(event_id, "event id")?;

        let endpoint = self.event_endpoint(calendar_id, event_id)?;
        let response = self
            .client
            .delete(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|error| {
                InfraError::Network(format!("network error while deleting event: {error}"))
            })?;

        let (status, body) = Self::read_body(response, "event delete").await?;
        if status.is_success() || status == StatusCode::GONE {
            return Ok(());
        }
        Err(api_error(status, &body, "Failed to delete event"))
    }
}
