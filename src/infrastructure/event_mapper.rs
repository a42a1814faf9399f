use crate::domain::models::{CalendarEvent, UNTITLED_EVENT_TITLE};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// All-day events carry `date` instead of `dateTime`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<CalendarEventDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<CalendarEventDateTime>,
}

/// Builds the request body for creating or updating a local session.
pub fn encode_local_event(event: &CalendarEvent, time_zone: Tz) -> GoogleCalendarEvent {
    GoogleCalendarEvent {
        id: None,
        summary: Some(event.title.clone()),
        status: None,
        start: Some(timed(event.start, time_zone)),
        end: Some(timed(event.end, time_zone)),
    }
}

fn timed(instant: DateTime<Utc>, time_zone: Tz) -> CalendarEventDateTime {
    CalendarEventDateTime {
        date_time: Some(instant.with_timezone(&time_zone).to_rfc3339()),
        date: None,
        time_zone: Some(time_zone.name().to_string()),
    }
}

/// Maps a remote item into a read-only external event.
///
/// Returns `Ok(None)` for items that cannot sit on a timed grid: cancelled
/// items, items without an id and all-day items (no `dateTime` on either end).
pub fn decode_external_event(
    event: &GoogleCalendarEvent,
) -> Result<Option<CalendarEvent>, InfraError> {
    let Some(id) = event
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };
    let is_cancelled = event
        .status
        .as_deref()
        .map(|status| status.eq_ignore_ascii_case("cancelled"))
        .unwrap_or(false);
    if is_cancelled {
        return Ok(None);
    }

    let (Some(start_raw), Some(end_raw)) = (timed_value(&event.start), timed_value(&event.end))
    else {
        return Ok(None);
    };
    let start = parse_rfc3339_utc(start_raw, "start.dateTime")?;
    let end = parse_rfc3339_utc(end_raw, "end.dateTime")?;
    if end <= start {
        return Ok(None);
    }

    let title = event
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNTITLED_EVENT_TITLE)
        .to_string();

    Ok(Some(CalendarEvent {
        id: id.to_string(),
        title,
        start,
        end,
        template_id: None,
        is_external: true,
        remote_id: Some(id.to_string()),
    }))
}

fn timed_value(value: &Option<CalendarEventDateTime>) -> Option<&str> {
    value
        .as_ref()
        .and_then(|value| value.date_time.as_deref())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_rfc3339_utc(value: &str, field_name: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            InfraError::Validation(format!(
                "invalid calendar event {field_name} '{value}': {error}"
            ))
        })
}
