//! Device state value objects built from response envelopes.
//!
//! Each snapshot is constructed fresh from one `value` and never mutated
//! afterwards. Construction goes through the coercion helpers in
//! [`crate::envelope`], so a missing or oddly encoded sub-field produces the
//! type's zero value instead of failing the whole call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::envelope::{
    bool_of, coerce_bool, coerce_float, coerce_int, coerce_string, int_of, stringify,
};

fn at<'a>(value: &'a Value, pointer: &str) -> Option<&'a Value> {
    value.pointer(pointer)
}

/// Readiness and build information reported by `/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhoneStatus {
    pub device: String,
    pub ip: String,
    pub agent_version: String,
    pub os_name: String,
    pub os_version: String,
    pub sdk_version: String,
    pub state: String,
    pub ready: bool,
}

impl PhoneStatus {
    pub fn from_value(value: &Value) -> Self {
        Self {
            device: stringify(at(value, "/device")),
            ip: stringify(at(value, "/ios/ip")),
            agent_version: stringify(at(value, "/build/version")),
            os_name: stringify(at(value, "/os/name")),
            os_version: stringify(at(value, "/os/version")),
            sdk_version: stringify(at(value, "/os/sdkVersion")),
            state: stringify(at(value, "/state")),
            ready: bool_of(at(value, "/ready")),
        }
    }
}

/// Hardware and locale details of the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub time_zone: String,
    pub current_locale: String,
    pub model: String,
    pub uuid: String,
    pub thermal_state: String,
    pub user_interface_idiom: i64,
    pub user_interface_style: String,
    pub name: String,
    pub is_simulator: bool,
}

impl DeviceInfo {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            time_zone: coerce_string(map, "timeZone"),
            current_locale: coerce_string(map, "currentLocale"),
            model: coerce_string(map, "model"),
            uuid: coerce_string(map, "uuid"),
            thermal_state: coerce_string(map, "thermalState"),
            user_interface_idiom: coerce_int(map, "userInterfaceIdiom"),
            user_interface_style: coerce_string(map, "userInterfaceStyle"),
            name: coerce_string(map, "name"),
            is_simulator: coerce_bool(map, "isSimulator"),
        }
    }
}

/// Geographic position and location-services authorization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub authorization_status: i64,
}

impl Location {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            latitude: coerce_float(map, "latitude"),
            longitude: coerce_float(map, "longitude"),
            altitude: coerce_float(map, "altitude"),
            authorization_status: coerce_int(map, "authorizationStatus"),
        }
    }
}

/// Battery charge and charging state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryInfo {
    /// Charge level in `0.0..=1.0`.
    pub level: f64,
    /// UIDeviceBatteryState raw value (0 unknown, 1 unplugged, 2 charging, 3 full).
    pub state: i64,
}

impl BatteryInfo {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            level: coerce_float(map, "level"),
            state: coerce_int(map, "state"),
        }
    }
}

/// A width/height pair in device points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: i64,
    pub height: i64,
}

impl WindowSize {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            width: coerce_int(map, "width"),
            height: coerce_int(map, "height"),
        }
    }

    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self::from_map(map),
            _ => Self::default(),
        }
    }
}

/// Screen geometry: point sizes plus the point-to-pixel scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub status_bar_size: WindowSize,
    pub scale: i64,
    pub screen_size: WindowSize,
}

impl ScreenSize {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            status_bar_size: WindowSize::from_value(map.get("statusBarSize")),
            scale: coerce_int(map, "scale"),
            screen_size: WindowSize::from_value(map.get("screenSize")),
        }
    }

    /// Converts a point coordinate to pixels.
    pub fn to_pixels(&self, points: f64) -> f64 {
        points * self.scale.max(1) as f64
    }
}

/// Launch arguments of the foreground application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessArguments {
    pub env: Map<String, Value>,
    pub args: Vec<String>,
}

/// The application currently in the foreground.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub pid: i64,
    pub bundle_id: String,
    pub process_arguments: ProcessArguments,
}

impl AppInfo {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let process_arguments = match map.get("processArguments") {
            Some(Value::Object(args)) => ProcessArguments {
                env: match args.get("env") {
                    Some(Value::Object(env)) => env.clone(),
                    _ => Map::new(),
                },
                args: match args.get("args") {
                    Some(Value::Array(items)) => {
                        items.iter().map(|item| stringify(Some(item))).collect()
                    }
                    _ => Vec::new(),
                },
            },
            _ => ProcessArguments::default(),
        };
        Self {
            name: coerce_string(map, "name"),
            pid: coerce_int(map, "pid"),
            bundle_id: coerce_string(map, "bundleId"),
            process_arguments,
        }
    }
}

/// One entry of the running-application list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSummary {
    pub pid: i64,
    pub bundle_id: String,
}

impl AppSummary {
    pub fn from_value(value: &Value) -> Self {
        Self {
            pid: int_of(value.get("pid")),
            bundle_id: stringify(value.get("bundleId")),
        }
    }

    /// Builds the list from a `value` that should be an array. Any other
    /// shape yields an empty list.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items.iter().map(Self::from_value).collect(),
            _ => Vec::new(),
        }
    }
}

/// Run state of an application, as reported by `/wda/apps/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    Unknown,
    NotRunning,
    RunningBackgroundSuspended,
    RunningBackground,
    RunningForeground,
}

impl AppState {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => AppState::NotRunning,
            2 => AppState::RunningBackgroundSuspended,
            3 => AppState::RunningBackground,
            4 => AppState::RunningForeground,
            _ => AppState::Unknown,
        }
    }

    pub fn from_value(value: &Value) -> Self {
        Self::from_code(int_of(Some(value)))
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            AppState::RunningBackgroundSuspended
                | AppState::RunningBackground
                | AppState::RunningForeground
        )
    }
}

/// Point coordinate in device point space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
