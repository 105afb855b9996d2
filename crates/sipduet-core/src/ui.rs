//! UI handles
//!
//! Controllers never look elements up themselves; buttons, video surfaces and
//! the alert sink are handed to them at construction. The headless
//! implementations here keep their state in memory and log changes, which is
//! all the CLI and the tests need.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::DemoConfig;

/// Button label while no call is active
pub const CALL_LABEL: &str = "video";

/// Button label during a call
pub const HANG_UP_LABEL: &str = "hang up";

/// Visibility of a video surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Visible => write!(f, "visible"),
            Visibility::Hidden => write!(f, "hidden"),
        }
    }
}

/// The single call/hang-up control of a user
pub trait CallButton: Send + Sync {
    fn id(&self) -> &str;
    fn label(&self) -> String;
    fn set_label(&self, label: &str);
}

/// Where the remote party's video is rendered
pub trait VideoSurface: Send + Sync {
    fn id(&self) -> &str;
    fn visibility(&self) -> Visibility;
    fn set_visibility(&self, visibility: Visibility);
}

/// Blocking, user-visible notification
pub trait Notifier: Send + Sync {
    fn alert(&self, message: &str);
}

/// In-memory button
#[derive(Debug)]
pub struct HeadlessButton {
    id: String,
    label: Mutex<String>,
}

impl HeadlessButton {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: Mutex::new(CALL_LABEL.to_string()),
        }
    }
}

impl CallButton for HeadlessButton {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.label.lock().clone()
    }

    fn set_label(&self, label: &str) {
        debug!("#{} label -> '{}'", self.id, label);
        *self.label.lock() = label.to_string();
    }
}

/// In-memory video surface, hidden until a call starts
#[derive(Debug)]
pub struct HeadlessSurface {
    id: String,
    visibility: Mutex<Visibility>,
}

impl HeadlessSurface {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            visibility: Mutex::new(Visibility::Hidden),
        }
    }
}

impl VideoSurface for HeadlessSurface {
    fn id(&self) -> &str {
        &self.id
    }

    fn visibility(&self) -> Visibility {
        *self.visibility.lock()
    }

    fn set_visibility(&self, visibility: Visibility) {
        debug!("#{} visibility -> {}", self.id, visibility);
        *self.visibility.lock() = visibility;
    }
}

/// Logs alerts and remembers them
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        error!("ALERT: {}", message);
        self.alerts.lock().push(message.to_string());
    }
}

/// Every UI handle the demo touches
#[derive(Clone)]
pub struct DemoUi {
    pub alice_button: Arc<dyn CallButton>,
    pub bob_button: Arc<dyn CallButton>,
    /// Shows Alice's video, on Bob's side
    pub video_of_alice: Arc<dyn VideoSurface>,
    /// Shows Bob's video, on Alice's side
    pub video_of_bob: Arc<dyn VideoSurface>,
    pub notifier: Arc<dyn Notifier>,
}

/// Concrete handles behind a headless [`DemoUi`], kept for inspection
#[derive(Debug, Clone)]
pub struct HeadlessUi {
    pub alice_button: Arc<HeadlessButton>,
    pub bob_button: Arc<HeadlessButton>,
    pub video_of_alice: Arc<HeadlessSurface>,
    pub video_of_bob: Arc<HeadlessSurface>,
    pub notifier: Arc<RecordingNotifier>,
}

impl HeadlessUi {
    /// Elements named after the configured users
    pub fn new(config: &DemoConfig) -> Self {
        Self {
            alice_button: Arc::new(HeadlessButton::new(config.alice.button_id())),
            bob_button: Arc::new(HeadlessButton::new(config.bob.button_id())),
            video_of_alice: Arc::new(HeadlessSurface::new(config.alice.video_id())),
            video_of_bob: Arc::new(HeadlessSurface::new(config.bob.video_id())),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    pub fn handles(&self) -> DemoUi {
        DemoUi {
            alice_button: self.alice_button.clone(),
            bob_button: self.bob_button.clone(),
            video_of_alice: self.video_of_alice.clone(),
            video_of_bob: self.video_of_bob.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
