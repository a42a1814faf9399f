use crate::domain::models::{CalendarEvent, OAuthToken};
use crate::infrastructure::credential_store::{CredentialStore, StoredToken};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{decode_external_event, encode_local_event};
use crate::infrastructure::google_calendar_client::{GoogleCalendarClient, ListEventsRequest};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const FETCH_DAYS_BEFORE: i64 = 7;
const FETCH_DAYS_AFTER: i64 = 30;
const TOKEN_EXPIRY_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Active,
    /// The remote rejected the credential; it has been removed.
    Expired,
}

/// External events from one fetch. Items that could not be decoded are
/// listed in `skipped` and left out of `events`.
#[derive(Debug, Default)]
pub struct FetchedEvents {
    pub events: Vec<CalendarEvent>,
    pub skipped: Vec<String>,
}

/// Talks to the remote calendar on behalf of the planner.
///
/// Every call reads the stored credential first. A missing credential or an
/// authentication failure from the remote yields `InfraError::Authentication`,
/// and in the latter case the credential is deleted before returning.
pub struct CalendarSyncService {
    calendar_client: Arc<dyn GoogleCalendarClient>,
    credential_store: Arc<dyn CredentialStore>,
    calendar_id: String,
    time_zone: Tz,
    now_provider: NowProvider,
}

impl CalendarSyncService {
    pub fn new(
        calendar_client: Arc<dyn GoogleCalendarClient>,
        credential_store: Arc<dyn CredentialStore>,
        calendar_id: impl Into<String>,
        time_zone: Tz,
    ) -> Self {
        Self {
            calendar_client,
            credential_store,
            calendar_id: calendar_id.into(),
            time_zone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn is_connected(&self) -> Result<bool, InfraError> {
        Ok(self.credential_store.load_token()?.is_some())
    }

    pub fn store_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        self.credential_store.save_token(token)
    }

    pub fn forget_token(&self) -> Result<(), InfraError> {
        self.credential_store.delete_token()
    }

    /// The window shown after connecting: one week back, thirty days ahead.
    pub fn default_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = (self.now_provider)();
        (
            now - Duration::days(FETCH_DAYS_BEFORE),
            now + Duration::days(FETCH_DAYS_AFTER),
        )
    }

    pub async fn fetch_external_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<FetchedEvents, InfraError> {
        if time_max <= time_min {
            return Err(InfraError::Validation(
                "time_max must be after time_min".to_string(),
            ));
        }
        let access_token = self.access_token()?;
        let items = self
            .guard(
                self.calendar_client
                    .list_events(
                        &access_token,
                        &self.calendar_id,
                        ListEventsRequest { time_min, time_max },
                    )
                    .await,
            )?;

        let mut fetched = FetchedEvents::default();
        for item in &items {
            match decode_external_event(item) {
                Ok(Some(event)) => fetched.events.push(event),
                Ok(None) => {}
                Err(error) => fetched.skipped.push(format!(
                    "{}: {error}",
                    item.id.as_deref().unwrap_or("<no id>")
                )),
            }
        }
        Ok(fetched)
    }

    pub async fn create_event(&self, event: &CalendarEvent) -> Result<String, InfraError> {
        let access_token = self.access_token()?;
        let body = encode_local_event(event, self.time_zone);
        self.guard(
            self.calendar_client
                .create_event(&access_token, &self.calendar_id, &body)
                .await,
        )
    }

    pub async fn update_event(&self, event: &CalendarEvent) -> Result<(), InfraError> {
        let remote_id = event.remote_id.as_deref().ok_or_else(|| {
            InfraError::Validation(format!("event {} has no remote id", event.id))
        })?;
        let access_token = self.access_token()?;
        let body = encode_local_event(event, self.time_zone);
        self.guard(
            self.calendar_client
                .update_event(&access_token, &self.calendar_id, remote_id, &body)
                .await,
        )
    }

    pub async fn delete_event(&self, remote_id: &str) -> Result<(), InfraError> {
        let access_token = self.access_token()?;
        self.guard(
            self.calendar_client
                .delete_event(&access_token, &self.calendar_id, remote_id)
                .await,
        )
    }

    pub async fn check_session(&self) -> Result<SessionStatus, InfraError> {
        let token = match self
            .credential_store
            .load_usable_token((self.now_provider)(), TOKEN_EXPIRY_LEEWAY_SECONDS)?
        {
            StoredToken::Missing => return Ok(SessionStatus::Disconnected),
            StoredToken::Expired => return Ok(SessionStatus::Expired),
            StoredToken::Usable(token) => token,
        };
        match self.calendar_client.check_access(&token.access_token).await {
            Ok(()) => Ok(SessionStatus::Active),
            Err(error) if error.is_authentication() => {
                self.credential_store.delete_token()?;
                Ok(SessionStatus::Expired)
            }
            Err(error) => Err(error),
        }
    }

    /// Probes the session every `period` until `max_ticks` probes have run
    /// (forever when `None`), handing each result to `on_status`. The first
    /// probe runs immediately.
    pub async fn watch_session<F>(&self, period: TokioDuration, max_ticks: Option<u64>, mut on_status: F)
    where
        F: FnMut(Result<SessionStatus, InfraError>),
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;
        loop {
            if max_ticks.is_some_and(|limit| ticks >= limit) {
                break;
            }
            ticker.tick().await;
            on_status(self.check_session().await);
            ticks = ticks.saturating_add(1);
        }
    }

    fn access_token(&self) -> Result<String, InfraError> {
        match self
            .credential_store
            .load_usable_token((self.now_provider)(), TOKEN_EXPIRY_LEEWAY_SECONDS)?
        {
            StoredToken::Usable(token) => Ok(token.access_token),
            StoredToken::Missing => Err(InfraError::Authentication(
                "not connected to Google Calendar".to_string(),
            )),
            StoredToken::Expired => Err(InfraError::Authentication(
                "stored access token has expired".to_string(),
            )),
        }
    }

    fn guard<T>(&self, result: Result<T, InfraError>) -> Result<T, InfraError> {
        if let Err(error) = &result {
            if error.is_authentication() {
                self.credential_store.delete_token()?;
            }
        }
        result
    }
}
