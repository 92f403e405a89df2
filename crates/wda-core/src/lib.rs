//! # wda-core
//!
//! Client library for WebDriverAgent-style device servers: the HTTP service
//! that runs on an iOS device and exposes session management, element search,
//! gestures, app control and screen capture as JSON-over-HTTP commands.
//!
//! ## Modules
//!
//! - [`session`] - [`WdaSession`](session::WdaSession), the session lifecycle and typed command methods
//! - [`command`] - Catalog of commands and their request/response shapes
//! - [`envelope`] - Parsing of the `{value, sessionId}` response envelope and value coercions
//! - [`snapshot`] - Typed views of device, app and screen state
//! - [`transport`] - The HTTP seam and its `reqwest` implementation
//! - [`artifact`] - Where screenshots and page-source dumps are written
//! - [`config`] - Persistent settings in `~/.wda/config.json`
//! - [`error`] - [`WdaError`](error::WdaError) and its categories
//!
//! ## Example
//!
//! ```no_run
//! use wda_core::config::WdaConfig;
//! use wda_core::session::WdaSession;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = WdaSession::from_config(&WdaConfig::load())?;
//! let status = session.status().await?;
//! println!("{} ready: {}", status.device, status.ready);
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod command;
pub mod config;
pub mod envelope;
pub mod error;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use error::{ErrorCategory, WdaError};
pub use session::{SessionState, WdaSession};
