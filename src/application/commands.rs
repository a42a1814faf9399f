use crate::application::bootstrap::bootstrap_workspace;
use crate::application::calendar_sync::{CalendarSyncService, SessionStatus};
use crate::domain::models::{
    default_week_modes, CalendarEvent, Notification, OAuthToken, Severity, TaskTemplate, WeekMode,
    DEFAULT_TEMPLATE_DURATION_MINUTES,
};
use crate::domain::planner::{ModeChangeRequest, PlaceOutcome, Planner, TemplateSummary};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::{
    GoogleCalendarClient, ReqwestGoogleCalendarClient,
};
use crate::infrastructure::storage::{
    load_notifications, load_state, save_notifications, save_state, PersistedState,
    SqliteStateStore, StateStore,
};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinSet;
use tokio::time::Duration as TokioDuration;

const REMOTE_CONCURRENCY: usize = 4;
const MAX_NOTIFICATIONS: usize = 50;
const SESSION_EXPIRED_MESSAGE: &str =
    "Your Google Calendar session has expired. Please reconnect.";
const LOCAL_DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

pub struct AppState {
    logs_dir: PathBuf,
    config: AppConfig,
    state_store: Arc<dyn StateStore>,
    sync: Arc<CalendarSyncService>,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_adapters(
            workspace_root,
            Arc::new(ReqwestGoogleCalendarClient::new()),
            Arc::new(KeyringCredentialStore::default()),
        )
    }

    pub fn with_adapters(
        workspace_root: PathBuf,
        calendar_client: Arc<dyn GoogleCalendarClient>,
        credential_store: Arc<dyn CredentialStore>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root, |key| std::env::var(key).ok())?;
        let state_store: Arc<dyn StateStore> =
            Arc::new(SqliteStateStore::new(&bootstrap.database_path));
        let sync = Arc::new(CalendarSyncService::new(
            calendar_client,
            credential_store,
            bootstrap.config.calendar_id.clone(),
            bootstrap.config.timezone,
        ));
        let (runtime, load_notes) = load_runtime(state_store.as_ref())?;

        let state = Self {
            logs_dir: bootstrap.logs_dir,
            config: bootstrap.config,
            state_store,
            sync,
            runtime: Mutex::new(runtime),
            log_guard: Mutex::new(()),
        };
        if !load_notes.is_empty() {
            for note in &load_notes {
                state.log_info("load_state", note);
            }
            let runtime = lock_runtime(&state)?;
            persist(&state, &runtime)?;
        }
        Ok(state)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    /// Queues a user-facing notification. Failures here are logged, never raised.
    ///
    /// The stored queue is re-read first so notifications written by other
    /// processes since this one started are kept.
    fn notify(&self, command: &str, message: impl Into<String>, severity: Severity) {
        let notification = Notification::new(message, severity);
        let result = lock_runtime(self).and_then(|mut runtime| {
            runtime.notifications = load_notifications(self.state_store.as_ref())?;
            runtime.notifications.push(notification);
            let overflow = runtime.notifications.len().saturating_sub(MAX_NOTIFICATIONS);
            if overflow > 0 {
                runtime.notifications = runtime.notifications.split_off(overflow);
            }
            save_notifications(self.state_store.as_ref(), &runtime.notifications)
        });
        if let Err(error) = result {
            self.log_error(command, &format!("failed to queue notification: {error}"));
        }
    }

    /// Remote failures after a local change: logged and surfaced, local state kept.
    fn report_remote_failure(&self, command: &str, error: &InfraError) {
        self.log_error(command, &error.to_string());
        self.notify_remote_failure(command, error);
    }

    fn notify_remote_failure(&self, command: &str, error: &InfraError) {
        if error.is_authentication() {
            self.notify(command, SESSION_EXPIRED_MESSAGE, Severity::Warning);
        } else {
            self.notify(command, error.to_string(), Severity::Error);
        }
    }

    fn is_connected(&self, command: &str) -> bool {
        match self.sync.is_connected() {
            Ok(connected) => connected,
            Err(error) => {
                self.log_error(command, &format!("failed to read credential: {error}"));
                false
            }
        }
    }

    fn event_response(&self, event: &CalendarEvent) -> EventResponse {
        let grid = &self.config.grid;
        EventResponse {
            id: event.id.clone(),
            title: event.title.clone(),
            start: grid.to_local(event.start).to_rfc3339(),
            end: grid.to_local(event.end).to_rfc3339(),
            template_id: event.template_id.clone(),
            is_external: event.is_external,
            remote_id: event.remote_id.clone(),
        }
    }
}

#[derive(Debug)]
struct RuntimeState {
    planner: Planner,
    notifications: Vec<Notification>,
}

fn load_runtime(store: &dyn StateStore) -> Result<(RuntimeState, Vec<String>), InfraError> {
    let persisted = load_state(store)?;
    let mut notes = Vec::new();

    let (mut planner, reconciled) = match Planner::restore(
        persisted.week_configs,
        &persisted.week_mode,
        persisted.events.clone(),
        persisted.used_sessions.clone(),
    ) {
        Ok(restored) => restored,
        Err(error) => {
            notes.push(format!("stored week modes rejected ({error}); using defaults"));
            Planner::restore(
                default_week_modes(),
                &persisted.week_mode,
                persisted.events,
                persisted.used_sessions,
            )?
        }
    };
    if reconciled {
        notes.push("session counts disagreed with stored events; re-derived".to_string());
    }
    if planner.active_mode_id() != persisted.week_mode {
        notes.push(format!(
            "week mode '{}' not found; using '{}'",
            persisted.week_mode,
            planner.active_mode_id()
        ));
    }
    if let Some(pending) = persisted.pending_week_mode.as_deref() {
        if planner.request_mode_change(pending).is_err() {
            notes.push(format!("dropped pending switch to unknown week mode '{pending}'"));
        }
    }
    if let Some(template_id) = persisted.active_template_id.as_deref() {
        if planner.select_template(template_id).is_err() {
            notes.push(format!("template '{template_id}' is no longer selectable"));
        }
    }

    Ok((
        RuntimeState {
            planner,
            notifications: load_notifications(store)?,
        },
        notes,
    ))
}

fn persist(state: &AppState, runtime: &RuntimeState) -> Result<(), InfraError> {
    let planner = &runtime.planner;
    save_state(
        state.state_store.as_ref(),
        &PersistedState {
            events: planner.events().to_vec(),
            used_sessions: planner.ledger().clone(),
            week_configs: planner.modes().to_vec(),
            week_mode: planner.active_mode_id().to_string(),
            pending_week_mode: planner.pending_mode().map(ToOwned::to_owned),
            active_template_id: planner.active_template_id().map(ToOwned::to_owned),
        },
    )
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventResponse {
    pub id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub is_external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeResponse {
    pub id: String,
    pub name: String,
    pub total_session_budget: u32,
    pub template_count: usize,
    pub is_active: bool,
    pub is_pending: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekSummaryResponse {
    pub mode_id: String,
    pub mode_name: String,
    pub total_session_budget: u32,
    /// Sum of template quotas; may differ from the budget.
    pub total_quota: u32,
    pub total_placed: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_mode_id: Option<String>,
    pub templates: Vec<TemplateSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModeChangeResponse {
    pub status: String,
    pub mode_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeSwitchResponse {
    pub active_mode_id: String,
    pub removed_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceResponse {
    pub status: String,
    pub template_id: String,
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearSessionsResponse {
    pub removed_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub connected: bool,
    pub external_events: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushPendingResponse {
    pub pushed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchSessionResponse {
    pub checks: u64,
    pub expired: bool,
}

pub fn list_modes_impl(state: &AppState) -> Result<Vec<ModeResponse>, InfraError> {
    let runtime = lock_runtime(state)?;
    let planner = &runtime.planner;
    Ok(planner
        .modes()
        .iter()
        .map(|mode| ModeResponse {
            id: mode.id.clone(),
            name: mode.name.clone(),
            total_session_budget: mode.total_session_budget,
            template_count: mode.templates.len(),
            is_active: mode.id == planner.active_mode_id(),
            is_pending: planner.pending_mode() == Some(mode.id.as_str()),
        })
        .collect())
}

pub fn week_summary_impl(state: &AppState) -> Result<WeekSummaryResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    let planner = &runtime.planner;
    let mode = planner.active_mode();
    Ok(WeekSummaryResponse {
        mode_id: mode.id.clone(),
        mode_name: mode.name.clone(),
        total_session_budget: mode.total_session_budget,
        total_quota: mode.total_quota(),
        total_placed: planner.total_placed(),
        pending_mode_id: planner.pending_mode().map(ToOwned::to_owned),
        templates: planner.template_summaries(),
    })
}

pub fn list_events_impl(state: &AppState) -> Result<Vec<EventResponse>, InfraError> {
    let mut events = {
        let runtime = lock_runtime(state)?;
        runtime.planner.events().to_vec()
    };
    events.sort_by(|left, right| left.start.cmp(&right.start).then(left.id.cmp(&right.id)));
    Ok(events.iter().map(|event| state.event_response(event)).collect())
}

pub fn select_mode_impl(state: &AppState, mode_id: String) -> Result<ModeChangeResponse, InfraError> {
    let mode_id = required(&mode_id, "mode_id")?;
    let mut runtime = lock_runtime(state)?;
    let request = runtime.planner.request_mode_change(mode_id)?;
    persist(state, &runtime)?;
    drop(runtime);

    let status = match request {
        ModeChangeRequest::Unchanged => "unchanged",
        ModeChangeRequest::PendingConfirm(_) => "pending_confirm",
    };
    state.log_info("select_mode", &format!("mode_id={mode_id} status={status}"));
    Ok(ModeChangeResponse {
        status: status.to_string(),
        mode_id: mode_id.to_string(),
    })
}

pub async fn confirm_mode_impl(state: &AppState) -> Result<ModeSwitchResponse, InfraError> {
    let (removed, active_mode_id, mode_name) = {
        let mut runtime = lock_runtime(state)?;
        let removed = runtime.planner.confirm_mode_change()?;
        persist(state, &runtime)?;
        let mode = runtime.planner.active_mode();
        (removed, mode.id.clone(), mode.name.clone())
    };

    state.log_info(
        "confirm_mode",
        &format!(
            "switched to mode_id={active_mode_id}, removed {} sessions",
            removed.len()
        ),
    );
    let removed_sessions = removed.len();
    delete_remote_events(state, "confirm_mode", removed).await;
    state.notify(
        "confirm_mode",
        format!("Switched to {mode_name} week"),
        Severity::Success,
    );

    Ok(ModeSwitchResponse {
        active_mode_id,
        removed_sessions,
    })
}

pub fn cancel_mode_impl(state: &AppState) -> Result<ModeChangeResponse, InfraError> {
    let mut runtime = lock_runtime(state)?;
    let cancelled = runtime.planner.cancel_mode_change();
    persist(state, &runtime)?;
    let active_mode_id = runtime.planner.active_mode_id().to_string();
    drop(runtime);

    match cancelled {
        Some(mode_id) => {
            state.log_info("cancel_mode", &format!("cancelled switch to mode_id={mode_id}"));
            Ok(ModeChangeResponse {
                status: "cancelled".to_string(),
                mode_id: active_mode_id,
            })
        }
        None => Ok(ModeChangeResponse {
            status: "unchanged".to_string(),
            mode_id: active_mode_id,
        }),
    }
}

pub fn save_mode_impl(
    state: &AppState,
    editing_id: Option<String>,
    name: String,
    total_sessions: u32,
) -> Result<WeekMode, InfraError> {
    let editing_id = optional(editing_id.as_deref());
    let mut runtime = lock_runtime(state)?;
    let saved = runtime.planner.save_mode(editing_id, &name, total_sessions)?;
    persist(state, &runtime)?;
    drop(runtime);

    let action = if editing_id.is_some() { "updated" } else { "created" };
    state.log_info("save_mode", &format!("{action} mode_id={}", saved.id));
    Ok(saved)
}

pub fn save_template_impl(
    state: &AppState,
    editing_id: Option<String>,
    title: String,
    sessions: u32,
    duration: Option<u32>,
) -> Result<TaskTemplate, InfraError> {
    let editing_id = optional(editing_id.as_deref());
    let duration = duration.unwrap_or(DEFAULT_TEMPLATE_DURATION_MINUTES);
    let mut runtime = lock_runtime(state)?;
    let saved = runtime
        .planner
        .save_template(editing_id, &title, sessions, duration, next_id("task"))?;
    persist(state, &runtime)?;
    let mode_id = runtime.planner.active_mode_id().to_string();
    drop(runtime);

    let action = if editing_id.is_some() { "updated" } else { "created" };
    state.log_info(
        "save_template",
        &format!("{action} template_id={} in mode_id={mode_id}", saved.id),
    );
    Ok(saved)
}

pub fn select_template_impl(state: &AppState, template_id: String) -> Result<TemplateSummary, InfraError> {
    let template_id = required(&template_id, "template_id")?;
    let mut runtime = lock_runtime(state)?;
    runtime.planner.select_template(template_id)?;
    persist(state, &runtime)?;
    runtime
        .planner
        .template_summaries()
        .into_iter()
        .find(|summary| summary.is_active)
        .ok_or_else(|| InfraError::NotFound(format!("template not found: {template_id}")))
}

/// Places a session at a local slot start (`YYYY-MM-DDTHH:MM` in the configured
/// timezone). Without `template_id` the selected template is used.
pub async fn place_session_impl(
    state: &AppState,
    template_id: Option<String>,
    slot: String,
) -> Result<PlaceResponse, InfraError> {
    let local = parse_local_datetime(&slot, "slot")?;
    let slot_start = state
        .config
        .grid
        .slot_start(local)
        .map_err(InfraError::Validation)?;

    let (outcome, template_id, template_title, remaining) = {
        let mut runtime = lock_runtime(state)?;
        let event_id = next_id("evt");
        let outcome = match optional(template_id.as_deref()) {
            Some(template_id) => runtime
                .planner
                .place_template(template_id, slot_start, event_id)?,
            None => runtime.planner.place_active_template(slot_start, event_id)?,
        };
        let template_id = match &outcome {
            PlaceOutcome::Placed(event) => event.template_id.clone().unwrap_or_default(),
            PlaceOutcome::QuotaExhausted { template_id } => template_id.clone(),
        };
        if matches!(outcome, PlaceOutcome::Placed(_)) {
            persist(state, &runtime)?;
        }
        let template_title = runtime
            .planner
            .active_mode()
            .template(&template_id)
            .map(|template| template.title.clone())
            .unwrap_or_else(|| template_id.clone());
        let remaining = runtime.planner.remaining(&template_id);
        (outcome, template_id, template_title, remaining)
    };

    match outcome {
        PlaceOutcome::Placed(event) => {
            state.log_info(
                "place_session",
                &format!(
                    "placed template_id={template_id} event_id={} at {}",
                    event.id,
                    event.start.to_rfc3339()
                ),
            );
            let event = mirror_created_event(state, "place_session", event).await;
            Ok(PlaceResponse {
                status: "placed".to_string(),
                template_id,
                remaining,
                event: Some(state.event_response(&event)),
            })
        }
        PlaceOutcome::QuotaExhausted { .. } => {
            state.log_info(
                "place_session",
                &format!("refused template_id={template_id}: no sessions remaining"),
            );
            state.notify(
                "place_session",
                format!("No sessions remaining for {template_title} this week"),
                Severity::Warning,
            );
            Ok(PlaceResponse {
                status: "quota_exhausted".to_string(),
                template_id,
                remaining,
                event: None,
            })
        }
    }
}

pub async fn move_session_impl(
    state: &AppState,
    event_id: String,
    start: String,
    end: String,
) -> Result<EventResponse, InfraError> {
    let event_id = required(&event_id, "event_id")?;
    let start = state
        .config
        .grid
        .slot_start(parse_local_datetime(&start, "start")?)
        .map_err(InfraError::Validation)?;
    let end = local_to_utc(state, parse_local_datetime(&end, "end")?)?;

    let moved = {
        let mut runtime = lock_runtime(state)?;
        let moved = runtime.planner.move_event(event_id, start, end)?;
        persist(state, &runtime)?;
        moved
    };
    state.log_info(
        "move_session",
        &format!(
            "moved event_id={event_id} start={} end={}",
            start.to_rfc3339(),
            end.to_rfc3339()
        ),
    );

    if moved.remote_id.is_some() && state.is_connected("move_session") {
        if let Err(error) = state.sync.update_event(&moved).await {
            state.report_remote_failure("move_session", &error);
        }
    }
    Ok(state.event_response(&moved))
}

pub async fn delete_session_impl(state: &AppState, event_id: String) -> Result<EventResponse, InfraError> {
    let event_id = required(&event_id, "event_id")?;
    let removed = {
        let mut runtime = lock_runtime(state)?;
        let removed = runtime.planner.delete_event(event_id)?;
        persist(state, &runtime)?;
        removed
    };
    state.log_info("delete_session", &format!("deleted event_id={event_id}"));

    let response = state.event_response(&removed);
    delete_remote_events(state, "delete_session", vec![removed]).await;
    Ok(response)
}

pub async fn clear_sessions_impl(state: &AppState) -> Result<ClearSessionsResponse, InfraError> {
    let removed = {
        let mut runtime = lock_runtime(state)?;
        let removed = runtime.planner.clear_sessions();
        persist(state, &runtime)?;
        removed
    };
    let removed_sessions = removed.len();
    state.log_info(
        "clear_sessions",
        &format!("cleared {removed_sessions} sessions"),
    );
    delete_remote_events(state, "clear_sessions", removed).await;
    Ok(ClearSessionsResponse { removed_sessions })
}

pub async fn connect_impl(
    state: &AppState,
    access_token: String,
    expires_in_seconds: Option<i64>,
) -> Result<SyncResponse, InfraError> {
    let access_token = required(&access_token, "access_token")?;
    let mut token = OAuthToken::bearer(access_token);
    if let Some(seconds) = expires_in_seconds {
        if seconds <= 0 {
            return Err(InfraError::Validation(
                "expires_in must be greater than 0".to_string(),
            ));
        }
        token.expires_at = Some(Utc::now() + Duration::seconds(seconds));
    }
    state.sync.store_token(&token)?;
    state.log_info("connect", "stored calendar credential");

    let external_events = refresh_external_events(state, "connect").await?;
    state.notify("connect", "Connected to Google Calendar", Severity::Success);
    Ok(SyncResponse {
        connected: true,
        external_events,
    })
}

pub async fn refresh_impl(state: &AppState) -> Result<SyncResponse, InfraError> {
    let external_events = refresh_external_events(state, "refresh").await?;
    Ok(SyncResponse {
        connected: true,
        external_events,
    })
}

pub fn disconnect_impl(state: &AppState) -> Result<SyncResponse, InfraError> {
    state.sync.forget_token()?;
    let removed = {
        let mut runtime = lock_runtime(state)?;
        let removed = runtime.planner.clear_external_events();
        persist(state, &runtime)?;
        removed
    };
    state.log_info(
        "disconnect",
        &format!("removed credential and {removed} external events"),
    );
    state.notify("disconnect", "Disconnected from Google Calendar", Severity::Info);
    Ok(SyncResponse {
        connected: false,
        external_events: 0,
    })
}

pub fn logout_impl(state: &AppState) -> Result<SyncResponse, InfraError> {
    state.sync.forget_token()?;
    {
        let mut runtime = lock_runtime(state)?;
        runtime.planner.clear_all_events();
        persist(state, &runtime)?;
    }
    state.log_info("logout", "removed credential and all events");
    state.notify("logout", "Logged out of Google Calendar", Severity::Info);
    Ok(SyncResponse {
        connected: false,
        external_events: 0,
    })
}

/// Creates remotely every local session that never got a remote id.
pub async fn push_pending_impl(state: &AppState) -> Result<PushPendingResponse, InfraError> {
    if !state.sync.is_connected()? {
        return Err(InfraError::Authentication(
            "not connected to Google Calendar".to_string(),
        ));
    }
    let pending = {
        let runtime = lock_runtime(state)?;
        runtime.planner.unsynced_local_events()
    };
    if pending.is_empty() {
        return Ok(PushPendingResponse { pushed: 0, failed: 0 });
    }

    let mut create_tasks: JoinSet<(String, Result<String, InfraError>)> = JoinSet::new();
    let mut created = Vec::new();
    let mut failures = Vec::new();
    for event in pending {
        let sync = Arc::clone(&state.sync);
        create_tasks.spawn(async move {
            let result = sync.create_event(&event).await;
            (event.id, result)
        });
        if create_tasks.len() >= REMOTE_CONCURRENCY {
            collect_remote_result(&mut create_tasks, &mut created, &mut failures).await;
        }
    }
    while !create_tasks.is_empty() {
        collect_remote_result(&mut create_tasks, &mut created, &mut failures).await;
    }

    if !created.is_empty() {
        let mut runtime = lock_runtime(state)?;
        for (event_id, remote_id) in &created {
            runtime.planner.set_remote_id(event_id, remote_id.clone());
        }
        persist(state, &runtime)?;
    }
    for (event_id, error) in &failures {
        state.log_error("push_pending", &format!("event_id={event_id}: {error}"));
    }
    if let Some((_, error)) = failures.first() {
        state.notify_remote_failure("push_pending", error);
    }

    state.log_info(
        "push_pending",
        &format!("pushed {} sessions, {} failed", created.len(), failures.len()),
    );
    Ok(PushPendingResponse {
        pushed: created.len(),
        failed: failures.len(),
    })
}

/// Probes the calendar session on the configured interval. An expired session
/// has already lost its credential by the time the warning is queued.
pub async fn watch_session_impl(
    state: &AppState,
    max_checks: Option<u64>,
) -> Result<WatchSessionResponse, InfraError> {
    let period = TokioDuration::from_secs(state.config.session_check_minutes.saturating_mul(60));
    let mut checks: u64 = 0;
    let mut expired = false;

    state
        .sync
        .watch_session(period, max_checks, |status| {
            checks = checks.saturating_add(1);
            match status {
                Ok(SessionStatus::Expired) => {
                    expired = true;
                    state.log_info("watch_session", "calendar session expired; credential removed");
                    state.notify("watch_session", SESSION_EXPIRED_MESSAGE, Severity::Warning);
                }
                Ok(SessionStatus::Active | SessionStatus::Disconnected) => {}
                Err(error) => state.log_error("watch_session", &error.to_string()),
            }
        })
        .await;

    Ok(WatchSessionResponse { checks, expired })
}

pub fn notifications_impl(state: &AppState, clear: bool) -> Result<Vec<Notification>, InfraError> {
    let mut runtime = lock_runtime(state)?;
    runtime.notifications = load_notifications(state.state_store.as_ref())?;
    if !clear {
        return Ok(runtime.notifications.clone());
    }
    let drained = std::mem::take(&mut runtime.notifications);
    save_notifications(state.state_store.as_ref(), &runtime.notifications)?;
    Ok(drained)
}

async fn refresh_external_events(state: &AppState, command: &str) -> Result<usize, InfraError> {
    let (time_min, time_max) = state.sync.default_window();
    let fetched = match state.sync.fetch_external_events(time_min, time_max).await {
        Ok(fetched) => fetched,
        Err(error) => {
            state.notify_remote_failure(command, &error);
            return Err(error);
        }
    };
    for skipped in &fetched.skipped {
        state.log_error(command, &format!("skipped calendar item {skipped}"));
    }
    let count = {
        let mut runtime = lock_runtime(state)?;
        runtime.planner.replace_external_events(fetched.events);
        persist(state, &runtime)?;
        runtime
            .planner
            .events()
            .iter()
            .filter(|event| event.is_external)
            .count()
    };
    state.log_info(
        command,
        &format!(
            "loaded {count} external events between {} and {}",
            time_min.to_rfc3339(),
            time_max.to_rfc3339()
        ),
    );
    Ok(count)
}

async fn mirror_created_event(state: &AppState, command: &str, event: CalendarEvent) -> CalendarEvent {
    if !state.is_connected(command) {
        return event;
    }
    match state.sync.create_event(&event).await {
        Ok(remote_id) => {
            let stored = lock_runtime(state).and_then(|mut runtime| {
                runtime.planner.set_remote_id(&event.id, remote_id.clone());
                persist(state, &runtime)
            });
            if let Err(error) = stored {
                state.log_error(command, &format!("failed to store remote id: {error}"));
            }
            CalendarEvent {
                remote_id: Some(remote_id),
                ..event
            }
        }
        Err(error) => {
            state.report_remote_failure(command, &error);
            event
        }
    }
}

async fn delete_remote_events(state: &AppState, command: &str, removed: Vec<CalendarEvent>) {
    let remote_ids: Vec<String> = removed
        .into_iter()
        .filter_map(|event| event.remote_id)
        .collect();
    if remote_ids.is_empty() || !state.is_connected(command) {
        return;
    }

    let mut delete_tasks: JoinSet<(String, Result<(), InfraError>)> = JoinSet::new();
    let mut deleted = Vec::new();
    let mut failures = Vec::new();
    for remote_id in remote_ids {
        let sync = Arc::clone(&state.sync);
        delete_tasks.spawn(async move {
            let result = sync.delete_event(&remote_id).await;
            (remote_id, result)
        });
        if delete_tasks.len() >= REMOTE_CONCURRENCY {
            collect_remote_result(&mut delete_tasks, &mut deleted, &mut failures).await;
        }
    }
    while !delete_tasks.is_empty() {
        collect_remote_result(&mut delete_tasks, &mut deleted, &mut failures).await;
    }

    for (remote_id, error) in &failures {
        state.log_error(command, &format!("remote_id={remote_id}: {error}"));
    }
    if let Some((_, error)) = failures.first() {
        state.notify_remote_failure(command, error);
    }
}

async fn collect_remote_result<T>(
    tasks: &mut JoinSet<(String, Result<T, InfraError>)>,
    succeeded: &mut Vec<(String, T)>,
    failures: &mut Vec<(String, InfraError)>,
) where
    T: Send + 'static,
{
    let Some(join_result) = tasks.join_next().await else {
        return;
    };
    match join_result {
        Ok((id, Ok(value))) => succeeded.push((id, value)),
        Ok((id, Err(error))) => failures.push((id, error)),
        Err(error) => failures.push((
            "unknown".to_string(),
            InfraError::Network(format!("failed to join calendar task: {error}")),
        )),
    }
}

fn required<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InfraError::Validation(format!("{field_name} must not be empty")));
    }
    Ok(trimmed)
}

fn optional(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_local_datetime(value: &str, field_name: &str) -> Result<NaiveDateTime, InfraError> {
    let trimmed = value.trim();
    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| {
            InfraError::Validation(format!(
                "{field_name} must be a local date-time like 2026-02-16T09:00: {value}"
            ))
        })
}

fn local_to_utc(state: &AppState, local: NaiveDateTime) -> Result<DateTime<Utc>, InfraError> {
    let time_zone = state.config.grid.timezone;
    time_zone
        .from_local_datetime(&local)
        .earliest()
        .map(|value| value.with_timezone(&Utc))
        .ok_or_else(|| {
            InfraError::Validation(format!("{local} does not exist in {}", time_zone.name()))
        })
}
