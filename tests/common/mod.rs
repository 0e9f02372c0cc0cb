#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use app_session::collab::{LogTelemetry, Notice, NoticeKind, Notifier, RuntimeSettings};
use app_session::storage::MemoryStorage;
use app_session::{AppConfig, Collaborators, Locale, Session, StorageBackends};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use wiremock::MockServer;

/// 서명 없는 JWT (클라이언트는 payload 만 읽음)
pub fn token(user_id: &str, expires_in_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::json!({
        "sub": user_id,
        "email": format!("{}@example.com", user_id),
        "roles": ["member"],
        "exp": chrono::Utc::now().timestamp() + expires_in_secs,
    });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, payload)
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn errors(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .iter()
            .filter(|n| n.kind == NoticeKind::Error)
            .cloned()
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

pub struct Harness {
    pub server: MockServer,
    pub settings: Arc<RuntimeSettings>,
    pub notifier: Arc<RecordingNotifier>,
    pub secure: Arc<MemoryStorage>,
    pub general: Arc<MemoryStorage>,
}

impl Harness {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            settings: Arc::new(RuntimeSettings::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            secure: Arc::new(MemoryStorage::new()),
            general: Arc::new(MemoryStorage::new()),
        }
    }

    pub fn config(&self) -> AppConfig {
        AppConfig::default()
            .with_base_url(&self.server.uri())
            .unwrap()
            .with_locale(Locale::En)
            .with_timeout(Duration::from_secs(5))
    }

    pub async fn session(&self) -> Session {
        self.session_with(self.config()).await
    }

    pub async fn session_with(&self, config: AppConfig) -> Session {
        Session::builder(config)
            .collaborators(Collaborators::new(
                self.settings.clone(),
                self.notifier.clone(),
                Arc::new(LogTelemetry),
            ))
            .backends(StorageBackends::new(self.secure.clone(), self.general.clone()))
            .build()
            .await
            .unwrap()
    }
}
