use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPLATE_DURATION_MINUTES: u32 = 30;
pub const DEFAULT_WEEK_MODE_ID: &str = "normal";
pub const UNTITLED_EVENT_TITLE: &str = "Untitled Event";

fn default_duration() -> u32 {
    DEFAULT_TEMPLATE_DURATION_MINUTES
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskTemplate {
    pub id: String,
    pub title: String,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(rename = "sessions")]
    pub session_quota: u32,
}

impl TaskTemplate {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "template.id")?;
        if self.title.trim().is_empty() {
            return Err("Template name is required".to_string());
        }
        if self.session_quota == 0 {
            return Err("Number of sessions must be greater than 0".to_string());
        }
        if self.duration == 0 {
            return Err("Duration must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeekMode {
    pub name: String,
    #[serde(rename = "value")]
    pub id: String,
    #[serde(rename = "totalSessions")]
    pub total_session_budget: u32,
    #[serde(rename = "tasks", default)]
    pub templates: Vec<TaskTemplate>,
}

impl WeekMode {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "mode.id")?;
        if self.name.trim().is_empty() {
            return Err("Mode name is required".to_string());
        }
        if self.total_session_budget == 0 {
            return Err("Total sessions must be greater than 0".to_string());
        }
        for template in &self.templates {
            template.validate()?;
        }
        Ok(())
    }

    pub fn template(&self, template_id: &str) -> Option<&TaskTemplate> {
        self.templates
            .iter()
            .find(|template| template.id == template_id)
    }

    pub fn total_quota(&self) -> u32 {
        self.templates
            .iter()
            .map(|template| template.session_quota)
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(rename = "templateId", default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(rename = "isExternalEvent", default)]
    pub is_external: bool,
    #[serde(rename = "googleEventId", default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl CalendarEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        if self.end <= self.start {
            return Err("event.end must be after event.start".to_string());
        }
        if !self.is_external && self.template_id.is_none() {
            return Err("local events must reference a template".to_string());
        }
        Ok(())
    }

    /// Only local events can be dragged, resized or deleted.
    pub fn is_movable(&self) -> bool {
        !self.is_external
    }

    pub fn local_template_id(&self) -> Option<&str> {
        if self.is_external {
            return None;
        }
        self.template_id.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at: None,
            scope: None,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        if self.access_token.trim().is_empty() {
            return false;
        }
        self.expires_at
            .map(|expires_at| expires_at > now + chrono::Duration::seconds(leeway_seconds))
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            created_at: Utc::now(),
        }
    }
}

/// Ids for new modes are derived from the name: lowercase, whitespace runs to `-`.
pub fn mode_id_from_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

pub fn default_week_modes() -> Vec<WeekMode> {
    vec![
        WeekMode {
            name: "Normal".to_string(),
            id: "normal".to_string(),
            total_session_budget: 30,
            templates: vec![
                template("reading", "Reading Session", 30, 6),
                template("exercise", "Exercise", 45, 5),
            ],
        },
        WeekMode {
            name: "Reduced".to_string(),
            id: "reduced".to_string(),
            total_session_budget: 20,
            templates: vec![
                template("reading", "Reading Session", 30, 4),
                template("exercise", "Exercise", 45, 3),
            ],
        },
    ]
}

fn template(id: &str, title: &str, duration: u32, session_quota: u32) -> TaskTemplate {
    TaskTemplate {
        id: id.to_string(),
        title: title.to_string(),
        duration,
        session_quota,
    }
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
