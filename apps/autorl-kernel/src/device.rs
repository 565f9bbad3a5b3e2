// [[AUTORL]]/apps/autorl-kernel/src/device.rs
// Purpose: Device view contract, gesture broadcast, and the in-memory mock phone.
// Architecture: Device Mock Layer
// Dependencies: async-trait, tokio broadcast

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::models::{Gesture, Rect};
use crate::screens::{ScreenRegistry, SCREEN_BANKING};

/// Read/command surface the sequencer drives.
#[async_trait]
pub trait DeviceView: Send + Sync {
    /// Geometry of `name` on the current screen, `None` if it is not shown.
    fn element_box(&self, name: &str) -> Option<Rect>;

    /// Resolves once the text has been entered.
    async fn type_text(&self, field: &str, value: &str);

    fn switch_app(&self, name: &str);
}

/// Broadcast of simulated input. Sending with no subscribers is not an error.
#[derive(Clone)]
pub struct GestureChannel {
    tx: broadcast::Sender<Gesture>,
}

impl GestureChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn dispatch(&self, gesture: Gesture) {
        tracing::trace!("Gesture dispatched: {:?}", gesture);
        let _ = self.tx.send(gesture);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Gesture> {
        self.tx.subscribe()
    }
}

#[derive(Default)]
struct MockState {
    screen: String,
    fields: HashMap<String, String>,
    app_history: Vec<String>,
}

/// Phone mock backed by the screen registry. The current screen name is the
/// app name passed to `switch_app`, or a layout primed by the runtime.
pub struct MockDevice {
    screens: Arc<ScreenRegistry>,
    keystroke_delay: Duration,
    state: RwLock<MockState>,
}

impl MockDevice {
    pub fn new(screens: Arc<ScreenRegistry>) -> Self {
        Self {
            screens,
            keystroke_delay: Duration::ZERO,
            state: RwLock::new(MockState {
                screen: SCREEN_BANKING.to_string(),
                ..Default::default()
            }),
        }
    }

    pub fn with_keystroke_delay(mut self, delay: Duration) -> Self {
        self.keystroke_delay = delay;
        self
    }

    /// Shows `screen` and clears any entered text. Does not count as an app switch.
    pub fn show_screen(&self, screen: &str) {
        if !self.screens.contains(screen) {
            tracing::warn!("Mock device showing unknown screen '{}'", screen);
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.screen = screen.to_string();
        state.fields.clear();
    }

    pub fn current_screen(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .screen
            .clone()
    }

    pub fn field_value(&self, field: &str) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .fields
            .get(field)
            .cloned()
    }

    pub fn app_history(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .app_history
            .clone()
    }
}

#[async_trait]
impl DeviceView for MockDevice {
    fn element_box(&self, name: &str) -> Option<Rect> {
        let screen = self.current_screen();
        self.screens.element(&screen, name)
    }

    async fn type_text(&self, field: &str, value: &str) {
        if self.keystroke_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            let keystrokes = value.chars().count() as u32;
            tokio::time::sleep(self.keystroke_delay * keystrokes).await;
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.fields.insert(field.to_string(), value.to_string());
    }

    fn switch_app(&self, name: &str) {
        tracing::debug!("Mock device switching to app '{}'", name);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.screen = name.to_string();
        state.fields.clear();
        state.app_history.push(name.to_string());
    }
}
