use crate::domain::ledger::SessionLedger;
use crate::domain::models::{
    default_week_modes, CalendarEvent, Notification, WeekMode, DEFAULT_WEEK_MODE_ID,
};
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub const KEY_EVENTS: &str = "events";
pub const KEY_USED_SESSIONS: &str = "usedSessions";
pub const KEY_WEEK_CONFIGS: &str = "weekConfigs";
pub const KEY_WEEK_MODE: &str = "weekMode";
pub const KEY_PENDING_WEEK_MODE: &str = "pendingWeekMode";
pub const KEY_ACTIVE_TEMPLATE: &str = "activeTemplate";
pub const KEY_NOTIFICATIONS: &str = "notifications";

const UPSERT_SQL: &str = "INSERT INTO kv_state (key, value, updated_at)
     VALUES (?1, ?2, ?3)
     ON CONFLICT(key) DO UPDATE SET
       value = excluded.value,
       updated_at = excluded.updated_at";
const DELETE_SQL: &str = "DELETE FROM kv_state WHERE key = ?1";

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Durable string values keyed by name.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn put(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;
    /// Applies every write or none of them. `None` removes the key.
    fn write_batch(&self, writes: &[(&str, Option<String>)]) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    db_path: PathBuf,
}

impl SqliteStateStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let value = connection
            .query_row(
                "SELECT value FROM kv_state WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(UPSERT_SQL, params![key, value, Utc::now().to_rfc3339()])?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(DELETE_SQL, params![key])?;
        Ok(())
    }

    fn write_batch(&self, writes: &[(&str, Option<String>)]) -> Result<(), InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let updated_at = Utc::now().to_rfc3339();
        for (key, value) in writes {
            match value {
                Some(value) => transaction.execute(UPSERT_SQL, params![key, value, updated_at])?,
                None => transaction.execute(DELETE_SQL, params![key])?,
            };
        }
        transaction.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryStateStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.values
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("state store lock poisoned: {error}")))
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn write_batch(&self, writes: &[(&str, Option<String>)]) -> Result<(), InfraError> {
        let mut values = self.lock()?;
        for (key, value) in writes {
            match value {
                Some(value) => values.insert((*key).to_string(), value.clone()),
                None => values.remove(*key),
            };
        }
        Ok(())
    }
}

/// Everything the planner needs to resume where it left off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedState {
    pub events: Vec<CalendarEvent>,
    pub used_sessions: SessionLedger,
    pub week_configs: Vec<WeekMode>,
    pub week_mode: String,
    /// A requested mode switch still awaiting confirmation.
    pub pending_week_mode: Option<String>,
    pub active_template_id: Option<String>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            used_sessions: SessionLedger::new(),
            week_configs: default_week_modes(),
            week_mode: DEFAULT_WEEK_MODE_ID.to_string(),
            pending_week_mode: None,
            active_template_id: None,
        }
    }
}

/// Reads each key independently; a missing key falls back to its default.
pub fn load_state(store: &dyn StateStore) -> Result<PersistedState, InfraError> {
    let defaults = PersistedState::default();

    let events = match store.get(KEY_EVENTS)? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => defaults.events,
    };
    let used_sessions = match store.get(KEY_USED_SESSIONS)? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => defaults.used_sessions,
    };
    let week_configs = match store.get(KEY_WEEK_CONFIGS)? {
        Some(raw) => {
            let parsed: Vec<WeekMode> = serde_json::from_str(&raw)?;
            if parsed.is_empty() {
                defaults.week_configs
            } else {
                parsed
            }
        }
        None => defaults.week_configs,
    };
    let week_mode = store
        .get(KEY_WEEK_MODE)?
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or(defaults.week_mode);

    Ok(PersistedState {
        events,
        used_sessions,
        week_configs,
        week_mode,
        pending_week_mode: read_optional_string(store, KEY_PENDING_WEEK_MODE)?,
        active_template_id: read_optional_string(store, KEY_ACTIVE_TEMPLATE)?,
    })
}

/// Writes all keys in one batch so events and session counts never diverge on disk.
pub fn save_state(store: &dyn StateStore, state: &PersistedState) -> Result<(), InfraError> {
    store.write_batch(&[
        (KEY_EVENTS, Some(serde_json::to_string(&state.events)?)),
        (KEY_USED_SESSIONS, Some(serde_json::to_string(&state.used_sessions)?)),
        (KEY_WEEK_CONFIGS, Some(serde_json::to_string(&state.week_configs)?)),
        (KEY_WEEK_MODE, Some(state.week_mode.clone())),
        (KEY_PENDING_WEEK_MODE, non_blank(state.pending_week_mode.as_deref())),
        (KEY_ACTIVE_TEMPLATE, non_blank(state.active_template_id.as_deref())),
    ])
}

fn read_optional_string(store: &dyn StateStore, key: &str) -> Result<Option<String>, InfraError> {
    Ok(store
        .get(key)?
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty()))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

pub fn load_notifications(store: &dyn StateStore) -> Result<Vec<Notification>, InfraError> {
    match store.get(KEY_NOTIFICATIONS)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

pub fn save_notifications(
    store: &dyn StateStore,
    notifications: &[Notification],
) -> Result<(), InfraError> {
    if notifications.is_empty() {
        return store.remove(KEY_NOTIFICATIONS);
    }
    store.put(KEY_NOTIFICATIONS, &serde_json::to_string(notifications)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;
    use chrono::{DateTime, Duration};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "weekblock-storage-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("state.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn sample_state() -> PersistedState {
        let start = DateTime::parse_from_rfc3339("2026-02-16T09:00:00+09:00")
            .expect("valid datetime")
            .with_timezone(&Utc);
        let event = CalendarEvent {
            id: "evt-1".to_string(),
            title: "Reading Session".to_string(),
            start,
            end: start + Duration::minutes(30),
            template_id: Some("reading".to_string()),
            is_external: false,
            remote_id: Some("remote-1".to_string()),
        };
        let mut used_sessions = SessionLedger::new();
        used_sessions.record("reading", 6);
        PersistedState {
            events: vec![event],
            used_sessions,
            week_configs: default_week_modes(),
            week_mode: "reduced".to_string(),
            pending_week_mode: Some("normal".to_string()),
            active_template_id: None,
        }
    }

    #[test]
    fn empty_store_loads_defaults() {
        let store = InMemoryStateStore::default();
        let loaded = load_state(&store).expect("load");
        assert_eq!(loaded, PersistedState::default());
    }

    #[test]
    fn sqlite_store_roundtrip_preserves_event_instants() {
        let database = TempDatabase::new();
        let store = SqliteStateStore::new(&database.path);
        let state = sample_state();

        save_state(&store, &state).expect("save");
        let loaded = load_state(&store).expect("load");

        assert_eq!(loaded.events[0].start, state.events[0].start);
        assert_eq!(loaded.events[0].end, state.events[0].end);
        assert_eq!(loaded, state);
    }

    #[test]
    fn week_mode_is_stored_as_plain_string() {
        let store = InMemoryStateStore::default();
        save_state(&store, &sample_state()).expect("save");
        assert_eq!(store.get(KEY_WEEK_MODE).expect("get"), Some("reduced".to_string()));
        assert_eq!(
            store.get(KEY_USED_SESSIONS).expect("get"),
            Some(r#"{"reading":1}"#.to_string())
        );
        assert_eq!(store.get(KEY_PENDING_WEEK_MODE).expect("get"), Some("normal".to_string()));
        assert_eq!(store.get(KEY_ACTIVE_TEMPLATE).expect("get"), None);
    }

    #[test]
    fn sqlite_put_overwrites_and_remove_deletes() {
        let database = TempDatabase::new();
        let store = SqliteStateStore::new(&database.path);
        store.put("weekMode", "normal").expect("put");
        store.put("weekMode", "reduced").expect("overwrite");
        assert_eq!(store.get("weekMode").expect("get"), Some("reduced".to_string()));
        store.remove("weekMode").expect("remove");
        assert_eq!(store.get("weekMode").expect("get"), None);
    }

    #[test]
    fn failed_save_leaves_previous_state_intact() {
        let database = TempDatabase::new();
        let store = SqliteStateStore::new(&database.path);
        let first = sample_state();
        save_state(&store, &first).expect("first save");

        Connection::open(&database.path)
            .expect("open database")
            .execute_batch(
                "CREATE TRIGGER reject_week_mode BEFORE UPDATE ON kv_state
                 WHEN NEW.key = 'weekMode'
                 BEGIN SELECT RAISE(ABORT, 'weekMode is locked'); END;",
            )
            .expect("create trigger");

        let mut second = first.clone();
        second.events.clear();
        second.used_sessions = SessionLedger::new();
        second.week_mode = "normal".to_string();
        assert!(matches!(save_state(&store, &second), Err(InfraError::Sqlite(_))));

        assert_eq!(load_state(&store).expect("load"), first);
    }

    #[test]
    fn notifications_roundtrip_and_clear() {
        let store = InMemoryStateStore::default();
        let pending = vec![Notification::new("Connected", Severity::Success)];
        save_notifications(&store, &pending).expect("save");
        assert_eq!(load_notifications(&store).expect("load"), pending);

        save_notifications(&store, &[]).expect("clear");
        assert_eq!(store.get(KEY_NOTIFICATIONS).expect("get"), None);
        assert!(load_notifications(&store).expect("load").is_empty());
    }

    #[test]
    fn corrupt_value_is_reported() {
        let store = InMemoryStateStore::default();
        store.put(KEY_EVENTS, "not json").expect("put");
        assert!(matches!(load_state(&store), Err(InfraError::Json(_))));
    }
}
