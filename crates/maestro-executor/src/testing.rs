//! Scripted desktop driver for tests.
//!
//! Models the target machine as plain state: windows, visible text,
//! accessibility elements, running processes, an optional blocking dialog,
//! and a lock counter. Tests arrange the state, run the engine through the
//! standard registry, and assert on the recorded actions.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::desktop::{Desktop, DesktopError, WindowInfo};

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ScriptState {
    /// Front of the list is the active window.
    windows: Vec<WindowInfo>,
    visible_text: HashSet<String>,
    elements: HashSet<String>,
    running: HashSet<String>,
    dialog_open: bool,
    /// `is_locked` reports true this many more times.
    locked_polls: u32,
    clicks: Vec<String>,
    point_clicks: usize,
    typed: Vec<String>,
    launched: Vec<String>,
    opened_urls: Vec<String>,
}

pub(crate) struct ScriptedDesktop {
    state: Mutex<ScriptState>,
    after_action: Mutex<Option<Hook>>,
}

impl ScriptedDesktop {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState::default()),
            after_action: Mutex::new(None),
        }
    }

    // ---- Arrangement ----

    pub(crate) fn add_window(&self, title: &str, process: &str) {
        self.state.lock().unwrap().windows.insert(
            0,
            WindowInfo {
                title: title.to_string(),
                process: process.to_string(),
            },
        );
    }

    pub(crate) fn add_element(&self, selector: &str) {
        self.state
            .lock()
            .unwrap()
            .elements
            .insert(selector.to_string());
    }

    pub(crate) fn add_visible_text(&self, text: &str) {
        self.state
            .lock()
            .unwrap()
            .visible_text
            .insert(text.to_string());
    }

    pub(crate) fn start_process(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .running
            .insert(name.to_lowercase());
    }

    pub(crate) fn set_dialog_open(&self, open: bool) {
        self.state.lock().unwrap().dialog_open = open;
    }

    pub(crate) fn set_locked_polls(&self, polls: u32) {
        self.state.lock().unwrap().locked_polls = polls;
    }

    /// Run a hook after every successful action (used to revoke sessions
    /// or mutate state mid-plan).
    pub(crate) fn set_after_action(&self, hook: Hook) {
        *self.after_action.lock().unwrap() = Some(hook);
    }

    pub(crate) fn focus_sync(&self, fragment: &str) {
        let mut state = self.state.lock().unwrap();
        let needle = fragment.to_lowercase();
        if let Some(pos) = state
            .windows
            .iter()
            .position(|w| w.title.to_lowercase().contains(&needle))
        {
            let window = state.windows.remove(pos);
            state.windows.insert(0, window);
        }
    }

    // ---- Observation ----

    pub(crate) fn active_window_sync(&self) -> Option<WindowInfo> {
        self.state.lock().unwrap().windows.first().cloned()
    }

    pub(crate) fn dialog_open(&self) -> bool {
        self.state.lock().unwrap().dialog_open
    }

    pub(crate) fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub(crate) fn point_clicks(&self) -> usize {
        self.state.lock().unwrap().point_clicks
    }

    pub(crate) fn typed(&self) -> Vec<String> {
        self.state.lock().unwrap().typed.clone()
    }

    pub(crate) fn launched(&self) -> Vec<String> {
        self.state.lock().unwrap().launched.clone()
    }

    pub(crate) fn opened_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().opened_urls.clone()
    }

    pub(crate) fn is_running(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .running
            .contains(&name.to_lowercase())
    }

    // ---- Internals ----

    fn guard_unlocked(state: &ScriptState) -> Result<(), DesktopError> {
        if state.locked_polls > 0 {
            Err(DesktopError::SessionLocked)
        } else {
            Ok(())
        }
    }

    fn fire_hook(&self) {
        let hook = self.after_action.lock().unwrap();
        if let Some(hook) = hook.as_ref() {
            hook();
        }
    }
}

#[async_trait]
impl Desktop for ScriptedDesktop {
    async fn active_window(&self) -> Result<Option<WindowInfo>, DesktopError> {
        Ok(self.active_window_sync())
    }

    async fn find_element(&self, selector: &str) -> Result<bool, DesktopError> {
        Ok(self.state.lock().unwrap().elements.contains(selector))
    }

    async fn click_element(&self, selector: &str) -> Result<(), DesktopError> {
        {
            let mut state = self.state.lock().unwrap();
            Self::guard_unlocked(&state)?;
            if state.dialog_open {
                return Err(DesktopError::DialogBlocking(
                    "modal dialog is open".to_string(),
                ));
            }
            if !state.elements.contains(selector) {
                return Err(DesktopError::ElementNotFound(selector.to_string()));
            }
            state.clicks.push(selector.to_string());
        }
        self.fire_hook();
        Ok(())
    }

    async fn click_point(&self, _x: i64, _y: i64) -> Result<(), DesktopError> {
        {
            let mut state = self.state.lock().unwrap();
            Self::guard_unlocked(&state)?;
            state.point_clicks += 1;
        }
        self.fire_hook();
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DesktopError> {
        {
            let mut state = self.state.lock().unwrap();
            Self::guard_unlocked(&state)?;
            state.typed.push(text.to_string());
            // Typed text becomes observable for verification.
            state.visible_text.insert(text.to_string());
        }
        self.fire_hook();
        Ok(())
    }

    async fn press_keys(&self, _keys: &[String]) -> Result<(), DesktopError> {
        let state = self.state.lock().unwrap();
        Self::guard_unlocked(&state)?;
        Ok(())
    }

    async fn scroll(&self, _delta: i64) -> Result<(), DesktopError> {
        let state = self.state.lock().unwrap();
        Self::guard_unlocked(&state)?;
        Ok(())
    }

    async fn launch_app(&self, app_name: &str) -> Result<(), DesktopError> {
        {
            let mut state = self.state.lock().unwrap();
            Self::guard_unlocked(&state)?;
            state.launched.push(app_name.to_string());
            state.running.insert(app_name.to_lowercase());
            state.windows.insert(
                0,
                WindowInfo {
                    title: app_name.to_string(),
                    process: app_name.to_lowercase(),
                },
            );
        }
        self.fire_hook();
        Ok(())
    }

    async fn focus_window(&self, title_fragment: &str) -> Result<(), DesktopError> {
        {
            let mut state = self.state.lock().unwrap();
            Self::guard_unlocked(&state)?;
            let needle = title_fragment.to_lowercase();
            let Some(pos) = state
                .windows
                .iter()
                .position(|w| w.title.to_lowercase().contains(&needle))
            else {
                return Err(DesktopError::WindowUnavailable(title_fragment.to_string()));
            };
            let window = state.windows.remove(pos);
            state.windows.insert(0, window);
        }
        self.fire_hook();
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), DesktopError> {
        {
            let mut state = self.state.lock().unwrap();
            Self::guard_unlocked(&state)?;
            state.opened_urls.push(url.to_string());
        }
        self.fire_hook();
        Ok(())
    }

    async fn dismiss_dialog(&self) -> Result<bool, DesktopError> {
        let mut state = self.state.lock().unwrap();
        if state.dialog_open {
            state.dialog_open = false;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn locate_text(&self, text: &str) -> Result<Option<(i64, i64)>, DesktopError> {
        let state = self.state.lock().unwrap();
        if state.visible_text.iter().any(|t| t.contains(text)) {
            Ok(Some((10, 10)))
        } else {
            Ok(None)
        }
    }

    async fn screen_contains_text(&self, text: &str) -> Result<bool, DesktopError> {
        let state = self.state.lock().unwrap();
        Ok(state.visible_text.iter().any(|t| t.contains(text)))
    }

    async fn process_running(&self, name: &str) -> Result<bool, DesktopError> {
        Ok(self.is_running(name))
    }

    async fn is_locked(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.locked_polls > 0 {
            state.locked_polls -= 1;
            true
        } else {
            false
        }
    }
}
