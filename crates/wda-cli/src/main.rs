//! Command-line client for WebDriverAgent-style device servers.
//!
//! Every subcommand maps to one device server command. Commands that need a
//! session reuse `--session-id` when given; otherwise a session is opened for
//! `--bundle-id` (or the configured bundle) and closed again afterwards.
//!
//! # Usage
//!
//! ```bash
//! # Is the device server up?
//! wda status
//!
//! # Open a session and keep it for later commands
//! export WDA_SESSION_ID=$(wda create-session --bundle-id com.apple.Preferences)
//!
//! # Find a button and tap it
//! id=$(wda find XCUIElementTypeButton --using "class name")
//! wda click "$id"
//!
//! # Tap at coordinates, then capture the screen
//! wda tap 100 200
//! wda screenshot after-tap --dir /tmp
//!
//! # Machine-readable output
//! wda --format json device-info
//!
//! # Persist the device server URL
//! wda config --set-url http://192.168.1.20:8100
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use wda_core::command::{parse_absolute_url, Button, NotificationKind, SearchStrategy};
use wda_core::config::WdaConfig;
use wda_core::error::{ErrorCategory, WdaError};
use wda_core::session::WdaSession;
use wda_core::snapshot::Point;

/// Command-line client for WebDriverAgent-style device servers.
#[derive(Parser)]
#[command(name = "wda")]
#[command(about = "Drive an iOS device through its WebDriverAgent server")]
#[command(version)]
struct Cli {
    /// Device server base URL [default: from config, else http://localhost:8100]
    #[arg(short, long, global = true, env = "WDA_URL")]
    url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, env = "WDA_TIMEOUT")]
    timeout: Option<u64>,

    /// Reuse an existing server session instead of opening one
    #[arg(short, long, global = true, env = "WDA_SESSION_ID")]
    session_id: Option<String>,

    /// Bundle to open a session for when no session id is given
    #[arg(short, long, global = true, env = "WDA_BUNDLE_ID")]
    bundle_id: Option<String>,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Show device server readiness and build info
    Status,
    /// Show device model, locale and time zone
    DeviceInfo,
    /// Show the device location
    Location,
    /// Show battery level and state
    Battery,
    /// Show the window size in points
    WindowSize,
    /// Show screen size and scale
    ScreenSize,
    /// Show the foreground application
    ActiveApp,
    /// List running applications
    Apps,
    /// Show the run state of an application
    AppState {
        /// Bundle identifier
        bundle: String,
    },
    /// Show the interface orientation
    Orientation,
    /// Report whether the screen is locked
    IsLocked,
    /// Lock the screen
    Lock,
    /// Unlock the screen
    Unlock,
    /// Go to the home screen
    Home,

    /// Save a screenshot
    Screenshot {
        /// File name; `.png` is appended unless it ends in png/jpg/jpeg
        #[arg(default_value = "screenshot")]
        name: String,
        /// Output directory [default: from config, else current directory]
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Print the accessibility tree as XML, or save it
    Source {
        /// Save to this file name (`.xml` appended when it has no extension)
        #[arg(long)]
        save: Option<String>,
        /// Output directory for --save
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Find the first element matching a selector and print its id
    Find {
        /// Selector value
        selector: String,
        /// Strategy: link text, partial link text, class name, xpath, class chain
        #[arg(long, default_value = "class name")]
        using: String,
    },
    /// Click an element
    Click {
        /// Element id
        element: String,
    },
    /// Type text into an element
    Type {
        /// Element id
        element: String,
        /// Text to type
        text: String,
    },
    /// Clear an element's text
    Clear {
        /// Element id
        element: String,
    },

    /// Print the text of the current alert
    AlertText,
    /// Accept the current alert
    AlertAccept,
    /// Dismiss the current alert
    AlertDismiss,

    /// Tap at coordinates
    Tap { x: f64, y: f64 },
    /// Double-tap at coordinates
    DoubleTap { x: f64, y: f64 },
    /// Touch and hold at coordinates
    Hold {
        x: f64,
        y: f64,
        /// Hold duration in seconds
        #[arg(long, default_value = "1.0")]
        duration: f64,
    },
    /// Drag between two points
    Drag {
        from_x: f64,
        from_y: f64,
        to_x: f64,
        to_y: f64,
        /// Press duration at the start point, in seconds
        #[arg(long, default_value = "0.5")]
        duration: f64,
    },

    /// Press a hardware button: volumeUp, volumeDown, home
    Press {
        /// Button name or legacy code (1, 2, 3)
        button: String,
    },
    /// Ask Siri something
    Siri {
        /// Text spoken to Siri
        text: String,
    },
    /// Open an absolute URL on the device
    OpenUrl {
        /// URL with a scheme, e.g. https://example.com or app-settings:
        url: String,
    },
    /// Wait for a notification
    ExpectNotification {
        /// Notification name
        name: String,
        /// Notification type: plain or darwin
        #[arg(long, default_value = "plain")]
        kind: NotificationKind,
        /// Seconds to wait
        #[arg(long, default_value = "60")]
        timeout_secs: f64,
    },

    /// Launch an application in the session
    Launch {
        /// Bundle identifier
        bundle: String,
    },
    /// Launch an application without a session
    LaunchUnattached {
        /// Bundle identifier
        bundle: String,
    },
    /// Terminate an application
    Terminate {
        /// Bundle identifier
        bundle: String,
    },
    /// Bring an application to the foreground
    Activate {
        /// Bundle identifier
        bundle: String,
    },
    /// Send the foreground application to the background for a while
    Deactivate {
        /// Seconds in the background
        #[arg(long, default_value = "3")]
        duration: f64,
    },
    /// Reset a privacy permission (e.g. camera, photos)
    ResetAuth {
        /// Protected resource name
        resource: String,
    },

    /// Open a session for --bundle-id and print its id
    CreateSession,
    /// Close the session given by --session-id
    CloseSession,
    /// Check that the session given by --session-id is still alive
    CheckSession,
    /// Stop the device server
    Shutdown,

    /// Show or update the persistent configuration
    Config {
        /// Set the device server base URL
        #[arg(long)]
        set_url: Option<String>,
        /// Set the request timeout in seconds
        #[arg(long)]
        set_timeout: Option<u64>,
        /// Set the default bundle identifier
        #[arg(long)]
        set_bundle_id: Option<String>,
        /// Set the artifact directory
        #[arg(long)]
        set_artifact_dir: Option<PathBuf>,
    },
}

/// How a subcommand uses the server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionUse {
    None,
    /// Reuse `--session-id`, or open one for the bundle and close it after.
    Scoped,
    /// Requires `--session-id`.
    Existing,
    /// Global command; binds `--session-id` when given but never opens one.
    Optional,
}

impl Command {
    fn session_use(&self) -> SessionUse {
        match self {
            Command::Status
            | Command::Screenshot { .. }
            | Command::Source { .. }
            | Command::CreateSession
            | Command::Config { .. } => SessionUse::None,
            Command::Home | Command::LaunchUnattached { .. } | Command::Shutdown => {
                SessionUse::Optional
            }
            Command::CloseSession | Command::CheckSession => SessionUse::Existing,
            _ => SessionUse::Scoped,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

enum CliError {
    Connection(String),
    CommandFailed(String),
    Protocol(String),
    InvalidInput(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::CommandFailed(_) => ExitCode::from(1),
            CliError::Connection(_) => ExitCode::from(2),
            CliError::Protocol(_) => ExitCode::from(3),
            CliError::InvalidInput(_) => ExitCode::from(4),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CliError::CommandFailed(msg) => write!(f, "Command failed: {}", msg),
            CliError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            CliError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl From<WdaError> for CliError {
    fn from(err: WdaError) -> Self {
        let msg = err.to_string();
        match err.category() {
            ErrorCategory::Network => CliError::Connection(msg),
            ErrorCategory::MalformedEnvelope => CliError::Protocol(msg),
            ErrorCategory::Validation => CliError::InvalidInput(msg),
            ErrorCategory::ProtocolMismatch | ErrorCategory::Artifact => {
                CliError::CommandFailed(msg)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

/// Rejects malformed buttons, strategies and URLs before any request.
fn validate(command: &Command) -> Result<(), CliError> {
    match command {
        Command::Press { button } => {
            button.parse::<Button>()?;
        }
        Command::Find { using, .. } => {
            using.parse::<SearchStrategy>()?;
        }
        Command::OpenUrl { url } => {
            parse_absolute_url(url)?;
        }
        _ => {}
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = WdaConfig::load();
    if let Command::Config {
        set_url,
        set_timeout,
        set_bundle_id,
        set_artifact_dir,
    } = &cli.command
    {
        return configure(
            &mut config,
            set_url.clone(),
            *set_timeout,
            set_bundle_id.clone(),
            set_artifact_dir.clone(),
            cli.format,
        );
    }

    if let Some(url) = &cli.url {
        config.base_url = url.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(bundle) = &cli.bundle_id {
        config.bundle_id = Some(bundle.clone());
    }

    validate(&cli.command)?;

    let mut session =
        WdaSession::from_config(&config).map_err(|e| CliError::Connection(e.to_string()))?;

    let mut opened = false;
    match cli.command.session_use() {
        SessionUse::None => {}
        SessionUse::Optional => {
            if let Some(id) = cli.session_id.as_deref() {
                session.attach(id)?;
            }
        }
        SessionUse::Existing => {
            let id = cli.session_id.as_deref().ok_or_else(|| {
                CliError::InvalidInput("this command needs --session-id".to_string())
            })?;
            session.attach(id)?;
        }
        SessionUse::Scoped => match cli.session_id.as_deref() {
            Some(id) => session.attach(id)?,
            None => {
                let bundle = config.bundle_id.as_deref().ok_or_else(|| {
                    CliError::InvalidInput(
                        "this command needs --session-id or --bundle-id".to_string(),
                    )
                })?;
                session.open(bundle).await?;
                opened = true;
            }
        },
    }

    let result = execute(&mut session, &cli.command, &config, cli.format).await;

    if opened {
        if let Err(e) = session.close().await {
            warn!(error = %e, "failed to close session");
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn emit<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(&T) -> String,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| CliError::Protocol(format!("failed to serialize output: {}", e)))?;
            println!("{}", json);
        }
        OutputFormat::Text => println!("{}", text(value)),
    }
    Ok(())
}

fn emit_ok(format: OutputFormat) -> Result<(), CliError> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::json!({"ok": true}));
    }
    Ok(())
}

fn emit_string(format: OutputFormat, value: &str) -> Result<(), CliError> {
    emit(format, &value, |v| v.to_string())
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

async fn execute(
    session: &mut WdaSession,
    command: &Command,
    config: &WdaConfig,
    format: OutputFormat,
) -> Result<(), CliError> {
    debug!(base_url = session.base_url(), "executing");
    match command {
        Command::Status => {
            let status = session.status().await?;
            emit(format, &status, |s| {
                format!(
                    "ready: {}\ndevice: {}\nip: {}\nos: {} {} (sdk {})\nagent: {}\nstate: {}",
                    s.ready, s.device, s.ip, s.os_name, s.os_version, s.sdk_version,
                    s.agent_version, s.state
                )
            })?;
        }
        Command::DeviceInfo => {
            let info = session.device_info().await?;
            emit(format, &info, |i| {
                format!(
                    "name: {}\nmodel: {}\nuuid: {}\nlocale: {}\ntime zone: {}\nsimulator: {}",
                    i.name, i.model, i.uuid, i.current_locale, i.time_zone, i.is_simulator
                )
            })?;
        }
        Command::Location => {
            let location = session.location().await?;
            emit(format, &location, |l| {
                format!(
                    "latitude: {}\nlongitude: {}\naltitude: {}\nauthorization: {}",
                    l.latitude, l.longitude, l.altitude, l.authorization_status
                )
            })?;
        }
        Command::Battery => {
            let battery = session.battery_info().await?;
            emit(format, &battery, |b| {
                format!("level: {:.0}%\nstate: {}", b.level * 100.0, b.state)
            })?;
        }
        Command::WindowSize => {
            let size = session.window_size().await?;
            emit(format, &size, |s| format!("{}x{}", s.width, s.height))?;
        }
        Command::ScreenSize => {
            let size = session.screen_size().await?;
            emit(format, &size, |s| {
                format!(
                    "screen: {}x{}\nstatus bar: {}x{}\nscale: {}",
                    s.screen_size.width,
                    s.screen_size.height,
                    s.status_bar_size.width,
                    s.status_bar_size.height,
                    s.scale
                )
            })?;
        }
        Command::ActiveApp => {
            let app = session.active_app_info().await?;
            emit(format, &app, |a| format!("{} (pid {}) {}", a.bundle_id, a.pid, a.name))?;
        }
        Command::Apps => {
            let apps = session.app_list().await?;
            emit(format, &apps, |list| {
                list.iter()
                    .map(|a| format!("{}\t{}", a.pid, a.bundle_id))
                    .collect::<Vec<_>>()
                    .join("\n")
            })?;
        }
        Command::AppState { bundle } => {
            let state = session.app_state(bundle).await?;
            emit(format, &state, |s| format!("{:?}", s))?;
        }
        Command::Orientation => {
            let orientation = session.orientation().await?;
            emit_string(format, &orientation)?;
        }
        Command::IsLocked => {
            let locked = session.is_locked().await?;
            emit(format, &locked, |l| l.to_string())?;
        }
        Command::Lock => {
            session.lock().await?;
            emit_ok(format)?;
        }
        Command::Unlock => {
            session.unlock().await?;
            emit_ok(format)?;
        }
        Command::Home => {
            session.home_screen().await?;
            emit_ok(format)?;
        }

        Command::Screenshot { name, dir } => {
            let dir = dir.clone().unwrap_or_else(|| config.artifact_dir());
            let path = session.screenshot(&dir, name).await?;
            emit_string(format, &path.display().to_string())?;
        }
        Command::Source { save, dir } => match save {
            Some(name) => {
                let dir = dir.clone().unwrap_or_else(|| config.artifact_dir());
                let path = session.save_page_source(&dir, name).await?;
                emit_string(format, &path.display().to_string())?;
            }
            None => {
                let xml = session.page_source().await?;
                emit_string(format, &xml)?;
            }
        },

        Command::Find { selector, using } => {
            let strategy: SearchStrategy = using.parse()?;
            let id = session.find_element(strategy, selector).await?;
            emit_string(format, &id)?;
        }
        Command::Click { element } => {
            session.click(element).await?;
            emit_ok(format)?;
        }
        Command::Type { element, text } => {
            session.type_text(element, text).await?;
            emit_ok(format)?;
        }
        Command::Clear { element } => {
            session.clear_text(element).await?;
            emit_ok(format)?;
        }

        Command::AlertText => {
            let text = session.alert_text().await?;
            emit_string(format, &text)?;
        }
        Command::AlertAccept => {
            session.accept_alert().await?;
            emit_ok(format)?;
        }
        Command::AlertDismiss => {
            session.dismiss_alert().await?;
            emit_ok(format)?;
        }

        Command::Tap { x, y } => {
            session.tap(Point::new(*x, *y)).await?;
            emit_ok(format)?;
        }
        Command::DoubleTap { x, y } => {
            session.double_tap(Point::new(*x, *y)).await?;
            emit_ok(format)?;
        }
        Command::Hold { x, y, duration } => {
            session.touch_and_hold(Point::new(*x, *y), *duration).await?;
            emit_ok(format)?;
        }
        Command::Drag {
            from_x,
            from_y,
            to_x,
            to_y,
            duration,
        } => {
            session
                .drag(Point::new(*from_x, *from_y), Point::new(*to_x, *to_y), *duration)
                .await?;
            emit_ok(format)?;
        }

        Command::Press { button } => {
            session.press_button_named(button).await?;
            emit_ok(format)?;
        }
        Command::Siri { text } => {
            session.activate_siri(text).await?;
            emit_ok(format)?;
        }
        Command::OpenUrl { url } => {
            session.open_url(url).await?;
            emit_ok(format)?;
        }
        Command::ExpectNotification {
            name,
            kind,
            timeout_secs,
        } => {
            session.expect_notification(name, *kind, *timeout_secs).await?;
            emit_ok(format)?;
        }

        Command::Launch { bundle } => {
            session.launch_app(bundle).await?;
            emit_ok(format)?;
        }
        Command::LaunchUnattached { bundle } => {
            session.launch_unattached(bundle).await?;
            emit_ok(format)?;
        }
        Command::Terminate { bundle } => {
            session.terminate_app(bundle).await?;
            emit_ok(format)?;
        }
        Command::Activate { bundle } => {
            session.activate_app(bundle).await?;
            emit_ok(format)?;
        }
        Command::Deactivate { duration } => {
            session.deactivate_app(*duration).await?;
            emit_ok(format)?;
        }
        Command::ResetAuth { resource } => {
            session.reset_app_auth(resource).await?;
            emit_ok(format)?;
        }

        Command::CreateSession => {
            let bundle = config.bundle_id.as_deref().ok_or_else(|| {
                CliError::InvalidInput("create-session needs --bundle-id".to_string())
            })?;
            let id = session.open(bundle).await?;
            emit_string(format, &id)?;
        }
        Command::CloseSession => {
            session.close().await?;
            emit_ok(format)?;
        }
        Command::CheckSession => {
            let alive = session.validate().await?;
            emit(format, &alive, |a| a.to_string())?;
            if !alive {
                return Err(CliError::CommandFailed(
                    "session is no longer known to the server".to_string(),
                ));
            }
        }
        Command::Shutdown => {
            session.shutdown().await?;
            emit_ok(format)?;
        }

        Command::Config { .. } => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn configure(
    config: &mut WdaConfig,
    url: Option<String>,
    timeout: Option<u64>,
    bundle_id: Option<String>,
    artifact_dir: Option<PathBuf>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let changed = url.is_some() || timeout.is_some() || bundle_id.is_some() || artifact_dir.is_some();
    if let Some(url) = url {
        parse_absolute_url(&url)?;
        config.base_url = url;
    }
    if let Some(timeout) = timeout {
        config.timeout_secs = timeout;
    }
    if bundle_id.is_some() {
        config.bundle_id = bundle_id;
    }
    if artifact_dir.is_some() {
        config.artifact_dir = artifact_dir;
    }
    if changed {
        config
            .save()
            .map_err(|e| CliError::CommandFailed(format!("failed to save config: {}", e)))?;
    }

    emit(format, &*config, |c| {
        format!(
            "config: {}\nbase_url: {}\ntimeout_secs: {}\nuser_agent: {}\nbundle_id: {}\nartifact_dir: {}",
            WdaConfig::path().display(),
            c.base_url,
            c.timeout_secs,
            c.user_agent,
            c.bundle_id.as_deref().unwrap_or("-"),
            c.artifact_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        )
    })?;
    Ok(())
}
