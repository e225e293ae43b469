//! Configuration file management for linetrack.
//!
//! Reads/writes `~/.linetrack/config.yaml` with transit API endpoints, the
//! tracked line and goal station, tracker tuning and dashboard address.

use std::path::{Path, PathBuf};

use crate::session::{TrackingOptions, DEFAULT_WINDOW_STATIONS};
use crate::tracker::{
    TrackerSettings, DEFAULT_HISTORY_CAPACITY, DEFAULT_MOVE_EPSILON_M,
    DEFAULT_SMOOTHING_TAU_SECS, HISTORY_CAPACITY_RANGE,
};
use crate::types::LineTrackError;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api: ApiConfig,
    pub tracking: TrackingConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    pub stops_url: String,
    pub negotiate_url: String,
    pub vehicles_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingConfig {
    pub line: Option<String>,
    pub direction: String,
    pub goal: Option<String>,
    pub window_stations: usize,
    pub history_capacity: usize,
    pub move_epsilon_m: f64,
    pub smoothing_tau_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api: ApiConfig {
                stops_url: "https://api.oisemob.cityway.fr:443/api/map/v2/GetLineStops/json".into(),
                negotiate_url:
                    "https://api.oisemob.cityway.fr/sdh/vehicles/negotiate?negotiateVersion=1"
                        .into(),
                vehicles_url: "wss://api.oisemob.cityway.fr/sdh/vehicles".into(),
            },
            tracking: TrackingConfig {
                line: None,
                direction: "1".into(),
                goal: None,
                window_stations: DEFAULT_WINDOW_STATIONS,
                history_capacity: DEFAULT_HISTORY_CAPACITY,
                move_epsilon_m: DEFAULT_MOVE_EPSILON_M,
                smoothing_tau_secs: DEFAULT_SMOOTHING_TAU_SECS,
            },
            dashboard: DashboardConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
        }
    }
}

impl TrackingConfig {
    /// Session options for a goal station, using this config's tuning.
    pub fn options(&self, goal_station_id: impl Into<String>) -> TrackingOptions {
        TrackingOptions {
            goal_station_id: goal_station_id.into(),
            window_stations: self.window_stations,
            tracker: TrackerSettings {
                history_capacity: self.history_capacity,
                move_epsilon_m: self.move_epsilon_m,
                smoothing_tau_secs: self.smoothing_tau_secs,
            },
        }
    }
}

/// Get the config directory path (`~/.linetrack/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".linetrack")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.linetrack/config.yaml`.
///
/// Returns default config if file doesn't exist.
pub fn load_config() -> Config {
    load_config_from(&config_file())
}

/// Load config from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(_) => Config::default(),
    }
}

/// Save config to `~/.linetrack/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, LineTrackError> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

/// Save config to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), LineTrackError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| LineTrackError::Config(e.to_string()))?;
    }
    std::fs::write(path, serialize_config(config))
        .map_err(|e| LineTrackError::Config(e.to_string()))
}

/// Parse simple YAML-like config text. Unknown keys are ignored.
pub fn parse_config(text: &str) -> Config {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        match current_section.as_deref() {
            Some("api") => {
                let target = match key {
                    "stops_url" => &mut config.api.stops_url,
                    "negotiate_url" => &mut config.api.negotiate_url,
                    "vehicles_url" => &mut config.api.vehicles_url,
                    _ => continue,
                };
                if let Some(v) = parse_string_value(val) {
                    *target = v;
                }
            }
            Some("tracking") => {
                let t = &mut config.tracking;
                match key {
                    "line" => t.line = parse_string_value(val),
                    "goal" => t.goal = parse_string_value(val),
                    "direction" => {
                        if let Some(v) = parse_string_value(val) {
                            t.direction = v;
                        }
                    }
                    "window_stations" => {
                        if let Ok(v) = val.parse() {
                            t.window_stations = v;
                        }
                    }
                    "history_capacity" => {
                        if let Ok(v) = val.parse::<usize>() {
                            t.history_capacity = v.clamp(
                                *HISTORY_CAPACITY_RANGE.start(),
                                *HISTORY_CAPACITY_RANGE.end(),
                            );
                        }
                    }
                    "move_epsilon_m" => {
                        if let Some(v) = parse_float_value(val).filter(|v| *v >= 0.0) {
                            t.move_epsilon_m = v;
                        }
                    }
                    "smoothing_tau_secs" => {
                        if let Some(v) = parse_float_value(val).filter(|v| *v > 0.0) {
                            t.smoothing_tau_secs = v;
                        }
                    }
                    _ => {}
                }
            }
            Some("dashboard") => match key {
                "host" => {
                    if let Some(v) = parse_string_value(val) {
                        config.dashboard.host = v;
                    }
                }
                "port" => {
                    if let Ok(v) = val.parse::<u16>() {
                        config.dashboard.port = v;
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    config
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> Option<f64> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    val.parse().ok()
}

fn optional(val: &Option<String>) -> String {
    match val {
        Some(v) => format!("\"{v}\""),
        None => "null".into(),
    }
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let t = &config.tracking;
    let lines = [
        "# linetrack configuration".to_string(),
        String::new(),
        "api:".into(),
        format!("  stops_url: \"{}\"", config.api.stops_url),
        format!("  negotiate_url: \"{}\"", config.api.negotiate_url),
        format!("  vehicles_url: \"{}\"", config.api.vehicles_url),
        String::new(),
        "tracking:".into(),
        format!("  line: {}", optional(&t.line)),
        format!("  direction: \"{}\"", t.direction),
        format!("  goal: {}", optional(&t.goal)),
        format!("  window_stations: {}", t.window_stations),
        format!("  history_capacity: {}", t.history_capacity),
        format!("  move_epsilon_m: {}", t.move_epsilon_m),
        format!("  smoothing_tau_secs: {}", t.smoothing_tau_secs),
        String::new(),
        "dashboard:".into(),
        format!("  host: \"{}\"", config.dashboard.host),
        format!("  port: {}", config.dashboard.port),
    ];
    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
