use crate::domain::grid::{parse_hhmm, WeekGrid};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
pub const TIMEZONE_ENV: &str = "WEEKBLOCK_TIMEZONE";

fn default_app_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "timezone": "UTC",
        "calendarId": "primary",
        "gridStart": "08:00",
        "gridEnd": "18:00",
        "slotMinutes": 30,
        "sessionCheckMinutes": 5
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub timezone: Tz,
    pub calendar_id: String,
    pub grid: WeekGrid,
    pub session_check_minutes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            calendar_id: "primary".to_string(),
            grid: WeekGrid::default(),
            session_check_minutes: 5,
        }
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_str<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn read_u64(value: &serde_json::Value, key: &str) -> Result<Option<u64>, InfraError> {
    match value.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(raw) => raw
            .as_u64()
            .map(Some)
            .ok_or_else(|| InfraError::InvalidConfig(format!("{key} must be a positive integer"))),
    }
}

pub fn parse_timezone(value: &str) -> Result<Tz, InfraError> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|_| InfraError::InvalidConfig(format!("unknown timezone: {value}")))
}

/// Loads `config/app.json`. `env` is consulted for overrides so tests can
/// inject values without touching the process environment.
pub fn load_app_config(
    config_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let defaults = AppConfig::default();

    let timezone = match env(TIMEZONE_ENV)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        Some(value) => parse_timezone(&value)?,
        None => match read_str(&app, "timezone") {
            Some(value) => parse_timezone(value)?,
            None => defaults.timezone,
        },
    };

    let calendar_id = read_str(&app, "calendarId")
        .map(ToOwned::to_owned)
        .unwrap_or(defaults.calendar_id);

    let day_start = match read_str(&app, "gridStart") {
        Some(value) => parse_hhmm(value)
            .ok_or_else(|| InfraError::InvalidConfig(format!("gridStart must be HH:MM: {value}")))?,
        None => defaults.grid.day_start,
    };
    let day_end = match read_str(&app, "gridEnd") {
        Some(value) => parse_hhmm(value)
            .ok_or_else(|| InfraError::InvalidConfig(format!("gridEnd must be HH:MM: {value}")))?,
        None => defaults.grid.day_end,
    };
    let slot_minutes = match read_u64(&app, "slotMinutes")? {
        Some(value) => u32::try_from(value)
            .map_err(|_| InfraError::InvalidConfig("slotMinutes is too large".to_string()))?,
        None => defaults.grid.slot_minutes,
    };
    let session_check_minutes =
        read_u64(&app, "sessionCheckMinutes")?.unwrap_or(defaults.session_check_minutes);
    if session_check_minutes == 0 {
        return Err(InfraError::InvalidConfig(
            "sessionCheckMinutes must be greater than 0".to_string(),
        ));
    }

    let grid = WeekGrid {
        day_start,
        day_end,
        slot_minutes,
        timezone,
    };
    grid.validate().map_err(InfraError::InvalidConfig)?;

    Ok(AppConfig {
        timezone,
        calendar_id,
        grid,
        session_check_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "weekblock-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp dir");
            Self { path }
        }

        fn write_app(&self, value: serde_json::Value) {
            fs::write(self.path.join(APP_JSON), value.to_string()).expect("write app.json");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_is_written_once_and_loads() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("defaults");
        let loaded = load_app_config(&dir.path, no_env).expect("load");
        assert_eq!(loaded, AppConfig::default());

        dir.write_app(serde_json::json!({"schema": 1, "calendarId": "team"}));
        ensure_default_configs(&dir.path).expect("defaults again");
        let loaded = load_app_config(&dir.path, no_env).expect("load");
        assert_eq!(loaded.calendar_id, "team");
    }

    #[test]
    fn env_timezone_overrides_file() {
        let dir = TempConfigDir::new();
        dir.write_app(serde_json::json!({"schema": 1, "timezone": "Europe/Berlin"}));

        let loaded = load_app_config(&dir.path, |key| {
            (key == TIMEZONE_ENV).then(|| "Asia/Tokyo".to_string())
        })
        .expect("load");
        assert_eq!(loaded.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(loaded.grid.timezone, chrono_tz::Asia::Tokyo);
    }

    #[test]
    fn grid_settings_are_read() {
        let dir = TempConfigDir::new();
        dir.write_app(serde_json::json!({
            "schema": 1,
            "gridStart": "07:00",
            "gridEnd": "21:00",
            "slotMinutes": 15
        }));
        let loaded = load_app_config(&dir.path, no_env).expect("load");
        assert_eq!(loaded.grid.day_start, NaiveTime::from_hms_opt(7, 0, 0).expect("time"));
        assert_eq!(loaded.grid.slot_minutes, 15);
        assert_eq!(loaded.grid.slots_per_day(), 56);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = TempConfigDir::new();
        dir.write_app(serde_json::json!({"schema": 2}));
        assert!(matches!(
            load_app_config(&dir.path, no_env),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write_app(serde_json::json!({"schema": 1, "timezone": "Mars/Olympus"}));
        assert!(matches!(
            load_app_config(&dir.path, no_env),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write_app(serde_json::json!({"schema": 1, "gridStart": "18:00", "gridEnd": "08:00"}));
        assert!(matches!(
            load_app_config(&dir.path, no_env),
            Err(InfraError::InvalidConfig(_))
        ));

        dir.write_app(serde_json::json!({"schema": 1, "sessionCheckMinutes": 0}));
        assert!(matches!(
            load_app_config(&dir.path, no_env),
            Err(InfraError::InvalidConfig(_))
        ));
    }
}
