//! Catalog of device server commands.
//!
//! Every operation the client can perform is a [`Command`] variant. A command
//! resolves to a [`Descriptor`] (verb, path, scope, JSON payload and the
//! [`ResponseRule`] used to judge the reply), which the session's single
//! generic executor sends and interprets. Adding an endpoint means adding a
//! variant and one arm in [`Command::descriptor`]; no bespoke request code.
//!
//! # Path scoping
//!
//! [`Scope::Session`] paths are relative to `/session/{id}` and need a bound
//! session. [`Scope::Global`] paths are sent as-is.
//!
//! # Example
//!
//! ```
//! use wda_core::command::{Button, Command, ResponseRule, Scope};
//! use wda_core::transport::Method;
//!
//! let descriptor = Command::PressButton { button: Button::Home }.descriptor();
//! assert_eq!(descriptor.method, Method::Post);
//! assert_eq!(descriptor.scope, Scope::Session);
//! assert_eq!(descriptor.path, "/wda/pressButton");
//! assert_eq!(descriptor.rule, ResponseRule::AckEmpty);
//! assert_eq!(descriptor.payload.unwrap()["name"], "home");
//! ```

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use url::Url;

use crate::envelope::{bool_of, kind, stringify, Envelope};
use crate::error::WdaError;
use crate::snapshot::Point;
use crate::transport::Method;

/// W3C element reference key, used when the legacy `ELEMENT` key is absent or empty.
const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a23c-4e84bca4f8a5";

// ---------------------------------------------------------------------------
// Closed enumerations
// ---------------------------------------------------------------------------

/// Hardware buttons accepted by `/wda/pressButton`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    VolumeUp,
    VolumeDown,
    Home,
}

impl Button {
    /// Name sent on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Button::VolumeUp => "volumeUp",
            Button::VolumeDown => "volumeDown",
            Button::Home => "home",
        }
    }

    /// Maps the legacy numeric codes 1, 2 and 3.
    pub fn from_code(code: i64) -> Result<Self, WdaError> {
        match code {
            1 => Ok(Button::VolumeUp),
            2 => Ok(Button::VolumeDown),
            3 => Ok(Button::Home),
            other => Err(WdaError::UnsupportedButton(other.to_string())),
        }
    }
}

impl FromStr for Button {
    type Err = WdaError;

    /// Accepts wire names case-insensitively, with optional `-`/`_`
    /// separators, and the numeric codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "volumeup" | "1" => Ok(Button::VolumeUp),
            "volumedown" | "2" => Ok(Button::VolumeDown),
            "home" | "3" => Ok(Button::Home),
            _ => Err(WdaError::UnsupportedButton(s.to_string())),
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Element search strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    LinkText,
    PartialLinkText,
    ClassName,
    Path,
    ClassChain,
}

impl SearchStrategy {
    /// The `using` value sent to the server.
    pub fn using(&self) -> &'static str {
        match self {
            SearchStrategy::LinkText => "link text",
            SearchStrategy::PartialLinkText => "partial link text",
            SearchStrategy::ClassName => "class name",
            SearchStrategy::Path => "xpath",
            SearchStrategy::ClassChain => "class chain",
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = WdaError;

    /// Accepts the `using` values (separators `-`, `_` and space are
    /// interchangeable), `path` as an alias of xpath, and the numeric codes
    /// 1 through 5.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .trim_start_matches("-ios")
            .trim()
            .replace(['-', '_'], " ")
            .to_ascii_lowercase();
        match normalized.as_str() {
            "link text" | "1" => Ok(SearchStrategy::LinkText),
            "partial link text" | "2" => Ok(SearchStrategy::PartialLinkText),
            "class name" | "3" => Ok(SearchStrategy::ClassName),
            "xpath" | "path" | "4" => Ok(SearchStrategy::Path),
            "class chain" | "5" => Ok(SearchStrategy::ClassChain),
            _ => Err(WdaError::UnsupportedSearchStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.using())
    }
}

/// Notification channels for `/wda/expectedNotification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Plain,
    Darwin,
}

impl NotificationKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            NotificationKind::Plain => "plain",
            NotificationKind::Darwin => "darwin",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(NotificationKind::Plain),
            "darwin" => Ok(NotificationKind::Darwin),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

/// Parses `raw` and requires it to be absolute (to carry a scheme).
pub fn parse_absolute_url(raw: &str) -> Result<Url, WdaError> {
    Url::parse(raw.trim()).map_err(|e| WdaError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Whether a path is prefixed with `/session/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Session,
}

/// How a response envelope is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseRule {
    /// `value` renders empty and `sessionId` matches the session.
    AckEmpty,
    /// `value` itself is the boolean result.
    BoolValue,
    /// `value` is handed back for conversion into a snapshot.
    StructuredValue,
    /// `value` is a match list; the first element handle is the result.
    ElementId,
    /// `value` is base64 data to decode.
    Base64Artifact,
    /// The envelope is returned untouched for lifecycle-specific checks.
    Raw,
}

/// A resolved request shape for one command.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub name: &'static str,
    pub method: Method,
    pub scope: Scope,
    pub path: String,
    pub payload: Option<Value>,
    pub rule: ResponseRule,
}

impl Descriptor {
    fn new(name: &'static str, method: Method, scope: Scope, path: impl Into<String>) -> Self {
        Self {
            name,
            method,
            scope,
            path: path.into(),
            payload: None,
            rule: ResponseRule::AckEmpty,
        }
    }

    fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    fn rule(mut self, rule: ResponseRule) -> Self {
        self.rule = rule;
        self
    }
}

/// The interpreted result of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack,
    Bool(bool),
    Value(Value),
    ElementId(String),
    Artifact(Vec<u8>),
    Envelope(Envelope),
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Every operation understood by the device server.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Session lifecycle
    CreateSession { bundle_id: String },
    SessionStatus,
    DeleteSession,

    // Global
    Status,
    HomeScreen,
    Screenshot,
    PageSource,
    LaunchUnattached { bundle_id: String },
    Shutdown,

    // Device state
    DeviceInfo,
    Location,
    BatteryInfo,
    WindowSize,
    ScreenSize,
    Orientation,
    IsLocked,
    Lock,
    Unlock,

    // Elements
    FindElement { strategy: SearchStrategy, selector: String },
    Click { element_id: String },
    TypeText { element_id: String, text: String },
    ClearText { element_id: String },

    // Alerts
    AlertText,
    AcceptAlert,
    DismissAlert,

    // Applications
    ActiveAppInfo,
    AppList,
    AppState { bundle_id: String },
    LaunchApp { bundle_id: String },
    TerminateApp { bundle_id: String },
    ActivateApp { bundle_id: String },
    DeactivateApp { duration: f64 },
    ResetAppAuth { resource: String },

    // Gestures, in device points
    Tap { at: Point },
    DoubleTap { at: Point },
    TouchAndHold { at: Point, duration: f64 },
    Drag { from: Point, to: Point, duration: f64 },

    // Hardware and system
    PressButton { button: Button },
    ExpectNotification { name: String, kind: NotificationKind, timeout: f64 },
    ActivateSiri { text: String },
    OpenUrl { url: Url },
}

impl Command {
    /// Short kebab-case name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateSession { .. } => "create-session",
            Command::SessionStatus => "session-status",
            Command::DeleteSession => "delete-session",
            Command::Status => "status",
            Command::HomeScreen => "home-screen",
            Command::Screenshot => "screenshot",
            Command::PageSource => "page-source",
            Command::LaunchUnattached { .. } => "launch-unattached",
            Command::Shutdown => "shutdown",
            Command::DeviceInfo => "device-info",
            Command::Location => "location",
            Command::BatteryInfo => "battery-info",
            Command::WindowSize => "window-size",
            Command::ScreenSize => "screen-size",
            Command::Orientation => "orientation",
            Command::IsLocked => "is-locked",
            Command::Lock => "lock",
            Command::Unlock => "unlock",
            Command::FindElement { .. } => "find-element",
            Command::Click { .. } => "click",
            Command::TypeText { .. } => "type-text",
            Command::ClearText { .. } => "clear-text",
            Command::AlertText => "alert-text",
            Command::AcceptAlert => "accept-alert",
            Command::DismissAlert => "dismiss-alert",
            Command::ActiveAppInfo => "active-app-info",
            Command::AppList => "app-list",
            Command::AppState { .. } => "app-state",
            Command::LaunchApp { .. } => "launch-app",
            Command::TerminateApp { .. } => "terminate-app",
            Command::ActivateApp { .. } => "activate-app",
            Command::DeactivateApp { .. } => "deactivate-app",
            Command::ResetAppAuth { .. } => "reset-app-auth",
            Command::Tap { .. } => "tap",
            Command::DoubleTap { .. } => "double-tap",
            Command::TouchAndHold { .. } => "touch-and-hold",
            Command::Drag { .. } => "drag",
            Command::PressButton { .. } => "press-button",
            Command::ExpectNotification { .. } => "expect-notification",
            Command::ActivateSiri { .. } => "activate-siri",
            Command::OpenUrl { .. } => "open-url",
        }
    }

    /// Resolves the request shape and response rule.
    pub fn descriptor(&self) -> Descriptor {
        use Method::{Delete, Get, Post};
        use ResponseRule::*;
        use Scope::{Global, Session};

        let name = self.name();
        let global = |method, path: &str| Descriptor::new(name, method, Global, path);
        let session = |method, path: &str| Descriptor::new(name, method, Session, path);

        match self {
            Command::CreateSession { bundle_id } => global(Post, "/session")
                .payload(json!({"capabilities": {"bundleId": bundle_id}}))
                .rule(Raw),
            Command::SessionStatus => session(Get, "").rule(Raw),
            Command::DeleteSession => session(Delete, "").rule(Raw),

            Command::Status => global(Get, "/status").rule(StructuredValue),
            Command::HomeScreen => global(Post, "/wda/homescreen"),
            Command::Screenshot => global(Get, "/screenshot").rule(Base64Artifact),
            Command::PageSource => global(Get, "/source").rule(StructuredValue),
            Command::LaunchUnattached { bundle_id } => global(Post, "/wda/apps/launchUnattached")
                .payload(json!({"bundleId": bundle_id})),
            Command::Shutdown => global(Get, "/wda/shutdown"),

            Command::DeviceInfo => session(Get, "/wda/device/info").rule(StructuredValue),
            Command::Location => session(Get, "/wda/location").rule(StructuredValue),
            Command::BatteryInfo => session(Get, "/wda/batteryInfo").rule(StructuredValue),
            Command::WindowSize => session(Get, "/window/size").rule(StructuredValue),
            Command::ScreenSize => session(Get, "/wda/screen").rule(StructuredValue),
            Command::Orientation => session(Get, "/orientation").rule(StructuredValue),
            Command::IsLocked => session(Get, "/wda/locked").rule(BoolValue),
            Command::Lock => session(Post, "/wda/lock"),
            Command::Unlock => session(Post, "/wda/unlock"),

            Command::FindElement { strategy, selector } => session(Post, "/elements")
                .payload(json!({"using": strategy.using(), "value": selector}))
                .rule(ElementId),
            Command::Click { element_id } => {
                session(Post, &format!("/element/{element_id}/click"))
            }
            Command::TypeText { element_id, text } => {
                let chars: Vec<String> = text.chars().map(String::from).collect();
                session(Post, &format!("/element/{element_id}/value"))
                    .payload(json!({"value": chars}))
            }
            Command::ClearText { element_id } => {
                session(Post, &format!("/element/{element_id}/clear"))
            }

            Command::AlertText => session(Get, "/alert/text").rule(StructuredValue),
            Command::AcceptAlert => session(Post, "/alert/accept"),
            Command::DismissAlert => session(Post, "/alert/dismiss"),

            Command::ActiveAppInfo => session(Get, "/wda/activeAppInfo").rule(StructuredValue),
            Command::AppList => session(Get, "/wda/apps/list").rule(StructuredValue),
            Command::AppState { bundle_id } => session(Post, "/wda/apps/state")
                .payload(json!({"bundleId": bundle_id}))
                .rule(StructuredValue),
            Command::LaunchApp { bundle_id } => {
                session(Post, "/wda/apps/launch").payload(json!({"bundleId": bundle_id}))
            }
            Command::TerminateApp { bundle_id } => session(Post, "/wda/apps/terminate")
                .payload(json!({"bundleId": bundle_id}))
                .rule(BoolValue),
            Command::ActivateApp { bundle_id } => {
                session(Post, "/wda/apps/activate").payload(json!({"bundleId": bundle_id}))
            }
            Command::DeactivateApp { duration } => {
                session(Post, "/wda/deactivateApp").payload(json!({"duration": duration}))
            }
            Command::ResetAppAuth { resource } => {
                session(Post, "/wda/resetAppAuth").payload(json!({"resource": resource}))
            }

            Command::Tap { at } => session(Post, "/wda/tap").payload(json!({"x": at.x, "y": at.y})),
            Command::DoubleTap { at } => {
                session(Post, "/wda/doubleTap").payload(json!({"x": at.x, "y": at.y}))
            }
            Command::TouchAndHold { at, duration } => session(Post, "/wda/touchAndHold")
                .payload(json!({"x": at.x, "y": at.y, "duration": duration})),
            Command::Drag { from, to, duration } => session(Post, "/wda/dragfromtoforduration")
                .payload(json!({
                    "fromX": from.x,
                    "fromY": from.y,
                    "toX": to.x,
                    "toY": to.y,
                    "duration": duration,
                })),

            Command::PressButton { button } => {
                session(Post, "/wda/pressButton").payload(json!({"name": button.wire_name()}))
            }
            Command::ExpectNotification {
                name,
                kind,
                timeout,
            } => session(Post, "/wda/expectedNotification").payload(json!({
                "name": name,
                "type": kind.wire_name(),
                "timeout": timeout,
            })),
            Command::ActivateSiri { text } => {
                session(Post, "/wda/siri/activate").payload(json!({"text": text}))
            }
            Command::OpenUrl { url } => session(Post, "/url").payload(json!({"url": url.as_str()})),
        }
    }

    /// Applies this command's response rule to an envelope.
    ///
    /// `expected_session_id` is the id the session currently holds (empty
    /// when unbound); only [`ResponseRule::AckEmpty`] consults it.
    pub fn interpret(&self, envelope: Envelope, expected_session_id: &str) -> Result<Reply, WdaError> {
        let name = self.name();
        match self.descriptor().rule {
            ResponseRule::Raw => Ok(Reply::Envelope(envelope)),
            ResponseRule::AckEmpty => {
                if envelope.is_ack(expected_session_id) {
                    Ok(Reply::Ack)
                } else {
                    Err(WdaError::mismatch(
                        name,
                        format!(
                            "expected empty value for session '{}', got value '{}' for session '{}'",
                            expected_session_id,
                            stringify(Some(envelope.value())),
                            envelope.session_id()
                        ),
                    ))
                }
            }
            ResponseRule::BoolValue => {
                if !envelope.has_value() {
                    return Err(WdaError::malformed(name, "response has no value field"));
                }
                Ok(Reply::Bool(bool_of(Some(envelope.value()))))
            }
            ResponseRule::StructuredValue => {
                if !envelope.has_value() {
                    return Err(WdaError::malformed(name, "response has no value field"));
                }
                Ok(Reply::Value(envelope.into_value()))
            }
            ResponseRule::ElementId => {
                let matches = envelope
                    .value_list()
                    .map_err(|e| WdaError::malformed(name, e.to_string()))?;
                let Some(first) = matches.first() else {
                    let (strategy, selector) = match self {
                        Command::FindElement { strategy, selector } => {
                            (strategy.to_string(), selector.clone())
                        }
                        _ => (String::new(), String::new()),
                    };
                    return Err(WdaError::NoElementFound { strategy, selector });
                };
                let handle = ["ELEMENT", W3C_ELEMENT_KEY]
                    .iter()
                    .map(|key| stringify(first.get(*key)))
                    .find(|handle| !handle.is_empty())
                    .unwrap_or_default();
                if handle.is_empty() {
                    return Err(WdaError::malformed(
                        name,
                        format!("first match has no element handle: {first}"),
                    ));
                }
                Ok(Reply::ElementId(handle))
            }
            ResponseRule::Base64Artifact => {
                let Value::String(encoded) = envelope.value() else {
                    return Err(WdaError::malformed(
                        name,
                        format!("expected base64 string, got {}", kind(envelope.value())),
                    ));
                };
                // Some server builds wrap the payload at 76 columns.
                let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = STANDARD
                    .decode(compact.as_bytes())
                    .map_err(|e| WdaError::malformed(name, format!("invalid base64: {e}")))?;
                Ok(Reply::Artifact(bytes))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
