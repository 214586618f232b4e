//! The boundary between strategies and the machine being automated.
//!
//! Actual OS integration (accessibility APIs, input injection, screen
//! reading) lives behind this trait; the execution engine never talks to
//! the platform directly. Implementations are injected at composition
//! time, so the engine, the strategies, and the verifier are all testable
//! against a scripted driver.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors surfaced by a desktop driver.
///
/// These are data, not control flow: strategies convert them into attempt
/// failures carrying a [`maestro_core::types::FailureClass`], and the
/// recovery layer decides what to do.
#[derive(Debug, Error)]
pub enum DesktopError {
    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("window unavailable: {0}")]
    WindowUnavailable(String),

    #[error("blocking dialog: {0}")]
    DialogBlocking(String),

    #[error("focus lost: {0}")]
    FocusLost(String),

    /// The target session is locked or on a secure desktop.
    #[error("automation target locked")]
    SessionLocked,

    #[error("input rejected: {0}")]
    InputRejected(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

/// Snapshot of a window known to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    /// Owning process name, lowercased by convention.
    pub process: String,
}

/// Driver interface for one target machine.
#[async_trait]
pub trait Desktop: Send + Sync {
    /// The currently focused window, if any.
    async fn active_window(&self) -> Result<Option<WindowInfo>, DesktopError>;

    /// Whether an element matching the selector currently exists.
    async fn find_element(&self, selector: &str) -> Result<bool, DesktopError>;

    /// Click an element located through the accessibility tree.
    async fn click_element(&self, selector: &str) -> Result<(), DesktopError>;

    /// Click at absolute screen coordinates.
    async fn click_point(&self, x: i64, y: i64) -> Result<(), DesktopError>;

    /// Type text into the focused element.
    async fn type_text(&self, text: &str) -> Result<(), DesktopError>;

    /// Press a key chord.
    async fn press_keys(&self, keys: &[String]) -> Result<(), DesktopError>;

    /// Scroll vertically by the given delta.
    async fn scroll(&self, delta: i64) -> Result<(), DesktopError>;

    /// Launch an application by name.
    async fn launch_app(&self, app_name: &str) -> Result<(), DesktopError>;

    /// Bring the window whose title contains the fragment to the front.
    async fn focus_window(&self, title_fragment: &str) -> Result<(), DesktopError>;

    /// Open a URL in the default browser.
    async fn open_url(&self, url: &str) -> Result<(), DesktopError>;

    /// Dismiss a blocking modal dialog, if one is present.
    ///
    /// Returns whether a dialog was actually dismissed.
    async fn dismiss_dialog(&self) -> Result<bool, DesktopError>;

    /// Locate visible text on screen, returning its center point.
    async fn locate_text(&self, text: &str) -> Result<Option<(i64, i64)>, DesktopError>;

    /// Whether the given text is visible anywhere on screen.
    async fn screen_contains_text(&self, text: &str) -> Result<bool, DesktopError>;

    /// Whether a process with the given name is running.
    async fn process_running(&self, name: &str) -> Result<bool, DesktopError>;

    /// Whether the target session is locked / inaccessible.
    async fn is_locked(&self) -> bool;
}

/// Driver that stages actions instead of performing them.
///
/// Every action is logged and reported successful, and every observation
/// reports the expected state, so admitted plans can be walked end to end
/// without touching the machine. Used by the CLI's dry-run mode.
pub struct DryRunDesktop;

#[async_trait]
impl Desktop for DryRunDesktop {
    async fn active_window(&self) -> Result<Option<WindowInfo>, DesktopError> {
        Ok(Some(WindowInfo {
            title: "Dry Run".to_string(),
            process: "maestro".to_string(),
        }))
    }

    async fn find_element(&self, selector: &str) -> Result<bool, DesktopError> {
        info!(selector, "dry-run: element lookup");
        Ok(true)
    }

    async fn click_element(&self, selector: &str) -> Result<(), DesktopError> {
        info!(selector, "dry-run: click staged");
        Ok(())
    }

    async fn click_point(&self, x: i64, y: i64) -> Result<(), DesktopError> {
        info!(x, y, "dry-run: coordinate click staged");
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DesktopError> {
        info!(chars = text.len(), "dry-run: typing staged");
        Ok(())
    }

    async fn press_keys(&self, keys: &[String]) -> Result<(), DesktopError> {
        info!(chord = keys.join("+"), "dry-run: keypress staged");
        Ok(())
    }

    async fn scroll(&self, delta: i64) -> Result<(), DesktopError> {
        info!(delta, "dry-run: scroll staged");
        Ok(())
    }

    async fn launch_app(&self, app_name: &str) -> Result<(), DesktopError> {
        info!(app_name, "dry-run: launch staged");
        Ok(())
    }

    async fn focus_window(&self, title_fragment: &str) -> Result<(), DesktopError> {
        info!(title_fragment, "dry-run: focus staged");
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), DesktopError> {
        info!(url, "dry-run: navigation staged");
        Ok(())
    }

    async fn dismiss_dialog(&self) -> Result<bool, DesktopError> {
        Ok(false)
    }

    async fn locate_text(&self, text: &str) -> Result<Option<(i64, i64)>, DesktopError> {
        info!(text, "dry-run: text located");
        Ok(Some((0, 0)))
    }

    async fn screen_contains_text(&self, _text: &str) -> Result<bool, DesktopError> {
        Ok(true)
    }

    async fn process_running(&self, _name: &str) -> Result<bool, DesktopError> {
        Ok(true)
    }

    async fn is_locked(&self) -> bool {
        false
    }
}
