//! Shared fixtures for the integration tests:
//! - a profile store seeded with one local and one remote profile
//! - a scriptable in-process engine
//! - a host that records every call

use tunnel_core::config::ExtensionConfig;
use tunnel_core::engine::{Engine, EngineFactory, PlatformCallbacks};
use tunnel_core::error::engine::EngineError;
use tunnel_core::error::store::StoreError;
use tunnel_core::lifecycle::{HostPlatform, LifecycleState};
use tunnel_core::store::{JsonProfileStore, ProfileStore};

use common::ErrorLocation;
use models::{Profile, ProfileBuilder, ProfileType, RemoteSettings};

use std::future::pending;
use std::panic::Location;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

pub const LOCAL_CONTENT: &str = r#"{"outbounds":[{"type":"direct"}]}"#;
pub const REMOTE_CONTENT: &str = r#"{"outbounds":[{"type":"vless"}]}"#;
pub const REMOTE_LOCATION: &str = "https://example.com/b.json";

/// Store with `[{1, "A", local}, {2, "B", remote}]`.
pub fn seeded_store(root: &Path) -> Arc<JsonProfileStore> {
    let store = JsonProfileStore::open(root).expect("Failed to open store");
    store
        .create(
            ProfileBuilder::default()
                .with_name("A")
                .with_type(ProfileType::Local),
            LOCAL_CONTENT,
        )
        .expect("Failed to create profile A");
    store
        .create(
            ProfileBuilder::default()
                .with_name("B")
                .with_type(ProfileType::Remote)
                .with_remote_location(REMOTE_LOCATION)
                .with_remote_settings(RemoteSettings {
                    auto_update: true,
                    auto_update_interval: 30,
                    last_updated_at: Some(1_700_000_000),
                }),
            REMOTE_CONTENT,
        )
        .expect("Failed to create profile B");
    Arc::new(store)
}

/// Config rooted at `base` with no settle delay, a short stop timeout and the
/// control socket off.
pub fn test_config(base: &Path, selected: i64) -> ExtensionConfig {
    ExtensionConfig {
        base_dir: base.to_path_buf(),
        selected_profile_id: selected,
        settle_delay_ms: 0,
        engine_stop_timeout_secs: 1,
        control_enabled: false,
        ..ExtensionConfig::default()
    }
}

/// Store whose every call fails.
pub struct BrokenStore;

impl ProfileStore for BrokenStore {
    fn get(&self, _id: i64) -> Result<Option<Profile>, StoreError> {
        Err(broken())
    }

    fn list(&self) -> Result<Vec<Profile>, StoreError> {
        Err(broken())
    }

    fn read_content(&self, _profile: &Profile) -> Result<String, StoreError> {
        Err(broken())
    }
}

fn broken() -> StoreError {
    StoreError::Unavailable {
        location: ErrorLocation::from(Location::caller()),
        reason: "disk on fire".to_string(),
    }
}

/// Counters and knobs shared by a [`FakeEngineFactory`] and its engines.
#[derive(Clone, Default)]
pub struct EngineTracker {
    pub created: Arc<AtomicUsize>,
    pub started: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    pub configs: Arc<Mutex<Vec<String>>>,
    pub callbacks: Arc<Mutex<Vec<PlatformCallbacks>>>,
    pub fail_start: Arc<AtomicBool>,
    pub reject_config: Arc<AtomicBool>,
    pub hang_on_close: Arc<AtomicBool>,
    pub fail_close: Arc<AtomicBool>,
}

impl EngineTracker {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn callbacks(&self, index: usize) -> PlatformCallbacks {
        self.callbacks.lock().expect("callbacks lock")[index].clone()
    }

    pub fn config(&self, index: usize) -> String {
        self.configs.lock().expect("configs lock")[index].clone()
    }
}

pub struct FakeEngineFactory {
    pub tracker: EngineTracker,
}

impl FakeEngineFactory {
    pub fn new() -> (Self, EngineTracker) {
        let tracker = EngineTracker::default();
        (
            Self {
                tracker: tracker.clone(),
            },
            tracker,
        )
    }
}

impl EngineFactory for FakeEngineFactory {
    type Engine = FakeEngine;

    fn create(
        &self,
        config: String,
        callbacks: PlatformCallbacks,
    ) -> Result<FakeEngine, EngineError> {
        if self.tracker.reject_config.load(Ordering::SeqCst) {
            return Err(EngineError::Config {
                message: "fake engine rejects this config".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.tracker.created.fetch_add(1, Ordering::SeqCst);
        self.tracker.configs.lock().expect("configs lock").push(config);
        self.tracker
            .callbacks
            .lock()
            .expect("callbacks lock")
            .push(callbacks);
        Ok(FakeEngine {
            tracker: self.tracker.clone(),
        })
    }
}

pub struct FakeEngine {
    tracker: EngineTracker,
}

impl Engine for FakeEngine {
    async fn start(&mut self) -> Result<(), EngineError> {
        if self.tracker.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::Start {
                message: "fake engine refused to start".to_string(),
                location: ErrorLocation::from(Location::caller()),
                source: None,
            });
        }
        self.tracker.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EngineError> {
        if self.tracker.hang_on_close.load(Ordering::SeqCst) {
            pending::<()>().await;
        }
        self.tracker.closed.fetch_add(1, Ordering::SeqCst);
        if self.tracker.fail_close.load(Ordering::SeqCst) {
            return Err(EngineError::Stop {
                message: "fake engine failed to close".to_string(),
                location: ErrorLocation::from(Location::caller()),
                source: None,
            });
        }
        Ok(())
    }
}

/// Host that remembers every call.
#[derive(Default)]
pub struct RecordingHost {
    pub reasserting: Mutex<Vec<bool>>,
    pub notifications: Mutex<Vec<String>>,
    pub cancellations: Mutex<Vec<String>>,
    /// Every call in order: `reasserting=<bool>`, `notify` or `cancel`.
    pub events: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn reasserting_calls(&self) -> Vec<bool> {
        self.reasserting.lock().expect("lock").clone()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.lock().expect("lock").len()
    }

    pub fn cancellations(&self) -> Vec<String> {
        self.cancellations.lock().expect("lock").clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("lock").clone()
    }

    fn record(&self, event: impl Into<String>) {
        self.events.lock().expect("lock").push(event.into());
    }
}

impl HostPlatform for RecordingHost {
    fn set_reasserting(&self, reasserting: bool) {
        self.reasserting.lock().expect("lock").push(reasserting);
        self.record(format!("reasserting={reasserting}"));
    }

    fn notify_user(&self, message: &str) {
        self.notifications
            .lock()
            .expect("lock")
            .push(message.to_string());
        self.record("notify");
    }

    fn cancel_tunnel_with_error(&self, message: &str) {
        self.cancellations
            .lock()
            .expect("lock")
            .push(message.to_string());
        self.record("cancel");
    }
}

/// Wait until the controller settles in a state matching `predicate`.
pub async fn wait_for_state<P>(state_rx: &mut watch::Receiver<LifecycleState>, predicate: P)
where
    P: FnMut(&LifecycleState) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), state_rx.wait_for(predicate))
        .await
        .expect("Timed out waiting for lifecycle state")
        .expect("Controller went away");
}

/// Lines currently in the diagnostic file under `base`.
pub fn diagnostic_lines(base: &Path) -> Vec<String> {
    std::fs::read_to_string(base.join("cache").join("stderr.log"))
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}
