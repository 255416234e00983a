use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};

use binwatch::notify::{LogSink, RecordingSink};
use binwatch::storage::{FileTokenCache, InMemoryTokenStore, PushTokenStore};
use binwatch::{
    BackgroundReceiver, BinwatchConfig, DriverId, HostError, ManualClock, NotificationRecord,
    NotificationSink, NotificationSource, Permission, PermissionPrompt, PermissionState,
    PushRegistrar, PushProvider, RegistrationOutcome,
};

struct Fixed(PermissionState);

impl PermissionPrompt for Fixed {
    fn query(&self, _: Permission) -> PermissionState {
        self.0
    }
    fn request(&self, _: Permission) -> PermissionState {
        self.0
    }
}

/// Issues whatever token is currently configured and counts requests.
struct ScriptedProvider {
    next: Mutex<Result<String, String>>,
    issued: AtomicUsize,
}

impl ScriptedProvider {
    fn new(token: &str) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(Ok(token.to_string())),
            issued: AtomicUsize::new(0),
        })
    }

    fn rotate(&self, token: &str) {
        *self.next.lock().unwrap() = Ok(token.to_string());
    }

    fn fail(&self, message: &str) {
        *self.next.lock().unwrap() = Err(message.to_string());
    }
}

impl PushProvider for ScriptedProvider {
    fn issue_token(&self, _: &str) -> Result<String, HostError> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        self.next
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| HostError::TokenUnavailable { message })
    }
}

struct BrokenTray;

impl NotificationSink for BrokenTray {
    fn show(&self, _: &NotificationRecord) -> Result<(), HostError> {
        Err(HostError::RenderFailed {
            message: "tray unavailable".to_string(),
        })
    }
}

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 2, 6, 30, 0).unwrap())
}

#[test]
fn push_message_renders_title_and_body() {
    let sink = Arc::new(RecordingSink::new());
    let receiver = BackgroundReceiver::new(&BinwatchConfig::default(), sink.clone());

    let record = receiver
        .on_message(br#"{"notification":{"title":"Bin 12 is full","body":"MG Road"}}"#);

    assert_eq!(record.title, "Bin 12 is full");
    assert_eq!(record.body, "MG Road");
    assert_eq!(record.icon.as_deref(), Some("/bin-full.png"));
    assert_eq!(record.source, NotificationSource::Push);
    assert_eq!(sink.records(), vec![record]);
}

#[test]
fn empty_or_malformed_push_uses_defaults() {
    let sink = Arc::new(RecordingSink::new());
    let cfg = BinwatchConfig {
        default_push_title: "Binwatch".to_string(),
        ..BinwatchConfig::default()
    };
    let receiver = BackgroundReceiver::new(&cfg, sink.clone());

    let payloads: [&[u8]; 3] = [b"{}", b"garbage", br#"{"notification":{"title":""}}"#];
    for payload in payloads {
        let record = receiver.on_message(payload);
        assert_eq!(record.title, "Binwatch");
        assert_eq!(record.body, "");
    }
    assert_eq!(sink.records().len(), 3);
}

#[test]
fn push_render_failure_is_swallowed() {
    let receiver = BackgroundReceiver::new(&BinwatchConfig::default(), Arc::new(BrokenTray));
    let record = receiver.on_message(br#"{"notification":{"body":"x"}}"#);
    assert_eq!(record.title, "Notification");
    assert_eq!(record.body, "x");

    // The log sink never fails.
    let receiver = BackgroundReceiver::new(&BinwatchConfig::default(), Arc::new(LogSink));
    assert_eq!(receiver.on_message(b"{}").title, "Notification");
}

#[test]
fn denied_permission_stores_no_token() {
    let tokens = Arc::new(InMemoryTokenStore::new());
    let provider = ScriptedProvider::new("tok-1");
    let registrar = PushRegistrar::new(
        &BinwatchConfig::default(),
        Arc::new(Fixed(PermissionState::Denied)),
        provider.clone(),
        tokens.clone(),
        Arc::new(clock()),
    );
    let driver = DriverId::new();

    assert_eq!(registrar.register(driver), RegistrationOutcome::PermissionDenied);
    assert_eq!(provider.issued.load(Ordering::SeqCst), 0);
    assert!(tokens.get(driver).unwrap().is_none());
}

#[test]
fn provider_failure_reports_token_unavailable() {
    let tokens = Arc::new(InMemoryTokenStore::new());
    let provider = ScriptedProvider::new("tok-1");
    provider.fail("no network");
    let registrar = PushRegistrar::new(
        &BinwatchConfig::default(),
        Arc::new(Fixed(PermissionState::Granted)),
        provider,
        tokens.clone(),
        Arc::new(clock()),
    );
    let driver = DriverId::new();

    assert_eq!(registrar.register(driver), RegistrationOutcome::TokenUnavailable);
    assert!(tokens.get(driver).unwrap().is_none());
}

#[test]
fn rotated_token_overwrites_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("push_tokens.bin");
    let clock = clock();
    let provider = ScriptedProvider::new("tok-1");
    let registrar = PushRegistrar::new(
        &BinwatchConfig::default(),
        Arc::new(Fixed(PermissionState::Granted)),
        provider.clone(),
        Arc::new(FileTokenCache::open(&path)),
        Arc::new(clock.clone()),
    );
    let driver = DriverId::new();

    let RegistrationOutcome::Registered(first) = registrar.register(driver) else {
        panic!("expected registration");
    };
    assert_eq!(first.token, "tok-1");

    // Unchanged token keeps the original registration time.
    clock.advance(Duration::hours(1));
    let RegistrationOutcome::Registered(again) = registrar.register(driver) else {
        panic!("expected registration");
    };
    assert_eq!(again, first);

    provider.rotate("tok-2");
    clock.advance(Duration::hours(1));
    let RegistrationOutcome::Registered(rotated) = registrar.register(driver) else {
        panic!("expected registration");
    };
    assert_eq!(rotated.token, "tok-2");
    assert!(rotated.registered_at > first.registered_at);

    // A fresh handle on the same file sees the latest token.
    let reopened = FileTokenCache::open(&path);
    assert_eq!(reopened.get(driver).unwrap().unwrap().token, "tok-2");
}

#[test]
fn configured_cache_path_persists_registrations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens").join("push_tokens.bin");
    let cfg = BinwatchConfig {
        token_cache_path: Some(path.clone()),
        ..BinwatchConfig::default()
    };
    let registrar = PushRegistrar::from_config(
        &cfg,
        Arc::new(Fixed(PermissionState::Granted)),
        ScriptedProvider::new("tok-9"),
        Arc::new(clock()),
    );
    let driver = DriverId::new();

    assert!(matches!(registrar.register(driver), RegistrationOutcome::Registered(_)));
    assert_eq!(FileTokenCache::open(&path).get(driver).unwrap().unwrap().token, "tok-9");
}
