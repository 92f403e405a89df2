//! Client session against a WebDriverAgent device server.
//!
//! [`WdaSession`] owns the base URL, the optional bound session id and the
//! default headers, and dispatches every [`Command`] through one generic
//! executor, [`WdaSession::run`]. The typed methods (`tap`, `device_info`,
//! `screenshot`, ...) are thin wrappers that build a command and convert the
//! [`Reply`].
//!
//! Command methods take `&mut self`, so a session has at most one request in
//! flight. Share a session between tasks by wrapping it in a mutex.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wda_core::session::WdaSession;
//! use wda_core::snapshot::Point;
//! use wda_core::transport::HttpTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new(std::time::Duration::from_secs(10))?);
//! let mut session = WdaSession::new("http://localhost:8100", transport);
//!
//! session.open("com.apple.Preferences").await?;
//! session.tap(Point::new(100.0, 200.0)).await?;
//! let path = session.screenshot("/tmp".as_ref(), "after-tap").await?;
//! println!("saved {}", path.display());
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument, trace};

use crate::artifact::{page_source_path, screenshot_path, ArtifactSink, FsArtifactSink};
use crate::command::{
    parse_absolute_url, Button, Command, Descriptor, NotificationKind, Reply, Scope,
    SearchStrategy,
};
use crate::config::{default_user_agent, WdaConfig};
use crate::envelope::{kind, stringify, Envelope};
use crate::error::WdaError;
use crate::snapshot::{
    AppInfo, AppState, AppSummary, BatteryInfo, DeviceInfo, Location, PhoneStatus, Point,
    ScreenSize, WindowSize,
};
use crate::transport::{HttpRequest, Transport, TransportError};

// ---------------------------------------------------------------------------
// Reply conversion
// ---------------------------------------------------------------------------

fn unexpected(command: &'static str, reply: Reply) -> WdaError {
    WdaError::malformed(command, format!("unexpected reply: {reply:?}"))
}

fn expect_value(command: &'static str, reply: Reply) -> Result<Value, WdaError> {
    match reply {
        Reply::Value(value) => Ok(value),
        other => Err(unexpected(command, other)),
    }
}

fn expect_object(command: &'static str, reply: Reply) -> Result<Map<String, Value>, WdaError> {
    match expect_value(command, reply)? {
        Value::Object(map) => Ok(map),
        other => Err(WdaError::malformed(
            command,
            format!("expected object value, got {}", kind(&other)),
        )),
    }
}

fn expect_ack(command: &'static str, reply: Reply) -> Result<(), WdaError> {
    match reply {
        Reply::Ack => Ok(()),
        other => Err(unexpected(command, other)),
    }
}

fn expect_bool(command: &'static str, reply: Reply) -> Result<bool, WdaError> {
    match reply {
        Reply::Bool(flag) => Ok(flag),
        other => Err(unexpected(command, other)),
    }
}

// ---------------------------------------------------------------------------
// WdaSession
// ---------------------------------------------------------------------------

/// Whether a server session id is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unbound,
    Bound,
}

/// A client bound to one device server and at most one server session.
pub struct WdaSession {
    base_url: String,
    session_id: Option<String>,
    headers: Vec<(String, String)>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ArtifactSink>,
}

impl std::fmt::Debug for WdaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WdaSession")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl WdaSession {
    /// Creates an unbound session. Artifacts go to the local filesystem.
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            session_id: None,
            headers: vec![
                ("User-Agent".to_string(), default_user_agent()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            transport,
            sink: Arc::new(FsArtifactSink),
        }
    }

    /// Creates an unbound session using an [`HttpTransport`](crate::transport::HttpTransport)
    /// built from `config`.
    pub fn from_config(config: &WdaConfig) -> Result<Self, TransportError> {
        let transport = Arc::new(config.transport()?);
        Ok(Self::new(config.base_url.clone(), transport)
            .with_header("User-Agent", config.user_agent.clone()))
    }

    /// Replaces the artifact sink.
    pub fn with_artifact_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets a header sent with every request, replacing any header of the
    /// same name (compared case-insensitively).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The bound server session id, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        match self.session_id {
            Some(_) => SessionState::Bound,
            None => SessionState::Unbound,
        }
    }

    // -----------------------------------------------------------------------
    // Executor
    // -----------------------------------------------------------------------

    fn url_for(&self, descriptor: &Descriptor) -> Result<String, WdaError> {
        match descriptor.scope {
            Scope::Global => Ok(format!("{}{}", self.base_url, descriptor.path)),
            Scope::Session => {
                let id = self.session_id.as_deref().ok_or(WdaError::NoActiveSession)?;
                Ok(format!("{}/session/{}{}", self.base_url, id, descriptor.path))
            }
        }
    }

    /// Sends one request and parses the envelope. Session-scoped descriptors
    /// fail with [`WdaError::NoActiveSession`] before any request when unbound.
    async fn exchange(&self, descriptor: &Descriptor) -> Result<Envelope, WdaError> {
        let url = self.url_for(descriptor)?;
        let mut request = HttpRequest::new(descriptor.method, url);
        for (name, value) in &self.headers {
            request = request.header(name.clone(), value.clone());
        }
        if let Some(payload) = &descriptor.payload {
            request = request.json(payload.clone());
        }

        debug!(command = descriptor.name, method = %descriptor.method, url = %request.url, "sending");
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|source| WdaError::Network {
                command: descriptor.name,
                source,
            })?;
        trace!(body = %String::from_utf8_lossy(&response.body), "response body");

        Envelope::parse(&response.body).map_err(|e| WdaError::malformed(descriptor.name, e.to_string()))
    }

    /// Executes any catalog command and applies its response rule.
    ///
    /// Lifecycle commands go through [`open`](Self::open), [`close`](Self::close)
    /// and [`validate`](Self::validate) so the bound session id stays in step
    /// with the server.
    #[instrument(skip_all, fields(command = command.name()), level = "debug")]
    pub async fn run(&mut self, command: Command) -> Result<Reply, WdaError> {
        let reply = match &command {
            Command::CreateSession { bundle_id } => {
                let bundle_id = bundle_id.clone();
                self.open(&bundle_id).await.map(|id| Reply::Value(Value::String(id)))
            }
            Command::DeleteSession => self.close().await.map(|()| Reply::Ack),
            Command::SessionStatus => self.validate().await.map(Reply::Bool),
            _ => self.dispatch(&command).await,
        };
        if let Err(e) = &reply {
            debug!(error = %e, "command failed");
        }
        reply
    }

    async fn dispatch(&self, command: &Command) -> Result<Reply, WdaError> {
        let envelope = self.exchange(&command.descriptor()).await?;
        let expected = self.session_id.as_deref().unwrap_or_default();
        command.interpret(envelope, expected)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Creates a server session for `bundle_id` and binds to it.
    ///
    /// Opening while bound replaces the stored id without deleting the old
    /// server session.
    #[instrument(skip(self), level = "debug")]
    pub async fn open(&mut self, bundle_id: &str) -> Result<String, WdaError> {
        let failed = |reason: String| WdaError::SessionCreationFailed {
            bundle_id: bundle_id.to_string(),
            reason,
        };

        let command = Command::CreateSession {
            bundle_id: bundle_id.to_string(),
        };
        let envelope = self
            .exchange(&command.descriptor())
            .await
            .map_err(|e| failed(e.to_string()))?;

        let id = envelope
            .value()
            .get("sessionId")
            .map(|v| stringify(Some(v)))
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| envelope.session_id().to_string());
        if id.is_empty() {
            return Err(failed("response carried no session id".to_string()));
        }

        if let Some(previous) = self.session_id.replace(id.clone()) {
            debug!(previous = %previous, "replaced bound session");
        }
        debug!(session_id = %id, "session opened");
        Ok(id)
    }

    /// Deletes the bound server session and unbinds.
    ///
    /// The id is kept when the server still reports a session in its reply.
    #[instrument(skip(self), level = "debug")]
    pub async fn close(&mut self) -> Result<(), WdaError> {
        if self.session_id.is_none() {
            return Err(WdaError::NoActiveSession);
        }
        let command = Command::DeleteSession;
        let envelope = self.exchange(&command.descriptor()).await?;
        if !envelope.session_id().is_empty() {
            return Err(WdaError::mismatch(
                command.name(),
                format!("server still reports session '{}'", envelope.session_id()),
            ));
        }
        self.session_id = None;
        debug!("session closed");
        Ok(())
    }

    /// Asks the server whether the bound session is still the one it knows.
    #[instrument(skip(self), level = "debug")]
    pub async fn validate(&self) -> Result<bool, WdaError> {
        let expected = self.session_id.clone().ok_or(WdaError::NoActiveSession)?;
        let envelope = self.exchange(&Command::SessionStatus.descriptor()).await?;
        Ok(envelope.session_id() == expected)
    }

    /// Binds to an existing server session without contacting the server.
    pub fn attach(&mut self, session_id: impl Into<String>) -> Result<(), WdaError> {
        let session_id = session_id.into();
        if session_id.is_empty() {
            return Err(WdaError::NoActiveSession);
        }
        self.session_id = Some(session_id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Device state
    // -----------------------------------------------------------------------

    #[instrument(skip(self), level = "debug")]
    pub async fn status(&mut self) -> Result<PhoneStatus, WdaError> {
        let reply = self.run(Command::Status).await?;
        Ok(PhoneStatus::from_value(&expect_value("status", reply)?))
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn device_info(&mut self) -> Result<DeviceInfo, WdaError> {
        let reply = self.run(Command::DeviceInfo).await?;
        Ok(DeviceInfo::from_map(&expect_object("device-info", reply)?))
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn location(&mut self) -> Result<Location, WdaError> {
        let reply = self.run(Command::Location).await?;
        Ok(Location::from_map(&expect_object("location", reply)?))
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn battery_info(&mut self) -> Result<BatteryInfo, WdaError> {
        let reply = self.run(Command::BatteryInfo).await?;
        Ok(BatteryInfo::from_map(&expect_object("battery-info", reply)?))
    }

    pub async fn window_size(&mut self) -> Result<WindowSize, WdaError> {
        let reply = self.run(Command::WindowSize).await?;
        Ok(WindowSize::from_map(&expect_object("window-size", reply)?))
    }

    pub async fn screen_size(&mut self) -> Result<ScreenSize, WdaError> {
        let reply = self.run(Command::ScreenSize).await?;
        Ok(ScreenSize::from_map(&expect_object("screen-size", reply)?))
    }

    /// Current interface orientation, e.g. `PORTRAIT`.
    pub async fn orientation(&mut self) -> Result<String, WdaError> {
        let reply = self.run(Command::Orientation).await?;
        Ok(stringify(Some(&expect_value("orientation", reply)?)))
    }

    pub async fn is_locked(&mut self) -> Result<bool, WdaError> {
        let reply = self.run(Command::IsLocked).await?;
        expect_bool("is-locked", reply)
    }

    pub async fn lock(&mut self) -> Result<(), WdaError> {
        let reply = self.run(Command::Lock).await?;
        expect_ack("lock", reply)
    }

    pub async fn unlock(&mut self) -> Result<(), WdaError> {
        let reply = self.run(Command::Unlock).await?;
        expect_ack("unlock", reply)
    }

    pub async fn home_screen(&mut self) -> Result<(), WdaError> {
        let reply = self.run(Command::HomeScreen).await?;
        expect_ack("home-screen", reply)
    }

    /// Stops the device server.
    pub async fn shutdown(&mut self) -> Result<(), WdaError> {
        let reply = self.run(Command::Shutdown).await?;
        expect_ack("shutdown", reply)
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Captures the screen and writes it to `dir/name` (see
    /// [`screenshot_path`] for extension handling). Returns the written path.
    #[instrument(skip(self), level = "debug")]
    pub async fn screenshot(&mut self, dir: &Path, name: &str) -> Result<PathBuf, WdaError> {
        let bytes = match self.run(Command::Screenshot).await? {
            Reply::Artifact(bytes) => bytes,
            other => return Err(unexpected("screenshot", other)),
        };
        let path = screenshot_path(dir, name);
        self.sink
            .write(&path, &bytes)
            .map_err(|source| WdaError::Artifact {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), bytes = bytes.len(), "screenshot saved");
        Ok(path)
    }

    /// Returns the accessibility tree as XML.
    pub async fn page_source(&mut self) -> Result<String, WdaError> {
        let reply = self.run(Command::PageSource).await?;
        Ok(stringify(Some(&expect_value("page-source", reply)?)))
    }

    /// Writes the page source to `dir/name` (`.xml` appended when `name` has
    /// no extension) and returns the path.
    #[instrument(skip(self), level = "debug")]
    pub async fn save_page_source(&mut self, dir: &Path, name: &str) -> Result<PathBuf, WdaError> {
        let xml = self.page_source().await?;
        let path = page_source_path(dir, name);
        self.sink
            .write(&path, xml.as_bytes())
            .map_err(|source| WdaError::Artifact {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // Elements and alerts
    // -----------------------------------------------------------------------

    /// Returns the id of the first element matching `selector`.
    #[instrument(skip(self), level = "debug")]
    pub async fn find_element(
        &mut self,
        strategy: SearchStrategy,
        selector: &str,
    ) -> Result<String, WdaError> {
        let reply = self
            .run(Command::FindElement {
                strategy,
                selector: selector.to_string(),
            })
            .await?;
        match reply {
            Reply::ElementId(id) => {
                debug!(element_id = %id, "element found");
                Ok(id)
            }
            other => Err(unexpected("find-element", other)),
        }
    }

    pub async fn click(&mut self, element_id: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::Click {
                element_id: element_id.to_string(),
            })
            .await?;
        expect_ack("click", reply)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn type_text(&mut self, element_id: &str, text: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::TypeText {
                element_id: element_id.to_string(),
                text: text.to_string(),
            })
            .await?;
        expect_ack("type-text", reply)
    }

    pub async fn clear_text(&mut self, element_id: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::ClearText {
                element_id: element_id.to_string(),
            })
            .await?;
        expect_ack("clear-text", reply)
    }

    /// Text of the alert currently shown.
    pub async fn alert_text(&mut self) -> Result<String, WdaError> {
        let reply = self.run(Command::AlertText).await?;
        Ok(stringify(Some(&expect_value("alert-text", reply)?)))
    }

    pub async fn accept_alert(&mut self) -> Result<(), WdaError> {
        let reply = self.run(Command::AcceptAlert).await?;
        expect_ack("accept-alert", reply)
    }

    pub async fn dismiss_alert(&mut self) -> Result<(), WdaError> {
        let reply = self.run(Command::DismissAlert).await?;
        expect_ack("dismiss-alert", reply)
    }

    // -----------------------------------------------------------------------
    // Applications
    // -----------------------------------------------------------------------

    pub async fn active_app_info(&mut self) -> Result<AppInfo, WdaError> {
        let reply = self.run(Command::ActiveAppInfo).await?;
        Ok(AppInfo::from_map(&expect_object("active-app-info", reply)?))
    }

    pub async fn app_list(&mut self) -> Result<Vec<AppSummary>, WdaError> {
        let reply = self.run(Command::AppList).await?;
        let value = expect_value("app-list", reply)?;
        if !value.is_array() {
            return Err(WdaError::malformed(
                "app-list",
                format!("expected list value, got {}", kind(&value)),
            ));
        }
        Ok(AppSummary::list_from_value(&value))
    }

    pub async fn app_state(&mut self, bundle_id: &str) -> Result<AppState, WdaError> {
        let reply = self
            .run(Command::AppState {
                bundle_id: bundle_id.to_string(),
            })
            .await?;
        Ok(AppState::from_value(&expect_value("app-state", reply)?))
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn launch_app(&mut self, bundle_id: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::LaunchApp {
                bundle_id: bundle_id.to_string(),
            })
            .await?;
        expect_ack("launch-app", reply)
    }

    /// Launches an app without a session.
    #[instrument(skip(self), level = "debug")]
    pub async fn launch_unattached(&mut self, bundle_id: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::LaunchUnattached {
                bundle_id: bundle_id.to_string(),
            })
            .await?;
        expect_ack("launch-unattached", reply)
    }

    /// Terminates an app. The server answering `false` is a failure.
    #[instrument(skip(self), level = "debug")]
    pub async fn terminate_app(&mut self, bundle_id: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::TerminateApp {
                bundle_id: bundle_id.to_string(),
            })
            .await?;
        if expect_bool("terminate-app", reply)? {
            Ok(())
        } else {
            Err(WdaError::mismatch(
                "terminate-app",
                format!("server reported false for '{bundle_id}'"),
            ))
        }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn activate_app(&mut self, bundle_id: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::ActivateApp {
                bundle_id: bundle_id.to_string(),
            })
            .await?;
        expect_ack("activate-app", reply)
    }

    /// Sends the foreground app to the background for `duration` seconds.
    pub async fn deactivate_app(&mut self, duration: f64) -> Result<(), WdaError> {
        let reply = self.run(Command::DeactivateApp { duration }).await?;
        expect_ack("deactivate-app", reply)
    }

    /// Resets a privacy permission, e.g. `"camera"`.
    pub async fn reset_app_auth(&mut self, resource: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::ResetAppAuth {
                resource: resource.to_string(),
            })
            .await?;
        expect_ack("reset-app-auth", reply)
    }

    // -----------------------------------------------------------------------
    // Gestures
    // -----------------------------------------------------------------------

    #[instrument(skip(self), level = "debug")]
    pub async fn tap(&mut self, at: Point) -> Result<(), WdaError> {
        let reply = self.run(Command::Tap { at }).await?;
        expect_ack("tap", reply)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn double_tap(&mut self, at: Point) -> Result<(), WdaError> {
        let reply = self.run(Command::DoubleTap { at }).await?;
        expect_ack("double-tap", reply)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn touch_and_hold(&mut self, at: Point, duration: f64) -> Result<(), WdaError> {
        let reply = self.run(Command::TouchAndHold { at, duration }).await?;
        expect_ack("touch-and-hold", reply)
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn drag(&mut self, from: Point, to: Point, duration: f64) -> Result<(), WdaError> {
        let reply = self.run(Command::Drag { from, to, duration }).await?;
        expect_ack("drag", reply)
    }

    // -----------------------------------------------------------------------
    // Hardware and system
    // -----------------------------------------------------------------------

    pub async fn press_button(&mut self, button: Button) -> Result<(), WdaError> {
        let reply = self.run(Command::PressButton { button }).await?;
        expect_ack("press-button", reply)
    }

    /// Parses `name` (see [`Button`]'s `FromStr`) and presses it. Unknown
    /// names fail without a request.
    pub async fn press_button_named(&mut self, name: &str) -> Result<(), WdaError> {
        let button: Button = name.parse()?;
        self.press_button(button).await
    }

    pub async fn expect_notification(
        &mut self,
        name: &str,
        kind: NotificationKind,
        timeout: f64,
    ) -> Result<(), WdaError> {
        let reply = self
            .run(Command::ExpectNotification {
                name: name.to_string(),
                kind,
                timeout,
            })
            .await?;
        expect_ack("expect-notification", reply)
    }

    pub async fn activate_siri(&mut self, text: &str) -> Result<(), WdaError> {
        let reply = self
            .run(Command::ActivateSiri {
                text: text.to_string(),
            })
            .await?;
        expect_ack("activate-siri", reply)
    }

    /// Opens an absolute URL on the device. Relative URLs fail without a
    /// request.
    #[instrument(skip(self), level = "debug")]
    pub async fn open_url(&mut self, raw: &str) -> Result<(), WdaError> {
        let url = parse_absolute_url(raw)?;
        let reply = self.run(Command::OpenUrl { url }).await?;
        expect_ack("open-url", reply)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
