//! 외부 협력자 인터페이스
//!
//! 이 레이어가 읽기만 하거나 fire-and-forget 으로 호출하는 바깥 세계:
//! - 설정 (fallback 저장소 플래그, 기본 URL override)
//! - 사용자 알림 (타임아웃 / 연결 끊김 토스트)
//! - 텔레메트리 (예외 캡처, 사용자 식별 연결)

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::storage::BackendKind;

// =====================================
// 설정
// =====================================

/// 런타임 설정 협력자 (소유/영속화는 바깥에서)
pub trait Settings: Send + Sync {
    /// true 면 일반 저장소, false 면 보안(키체인) 저장소
    fn use_fallback_storage(&self) -> bool;

    fn base_url_override(&self) -> Option<String>;

    fn backend_kind(&self) -> BackendKind {
        if self.use_fallback_storage() {
            BackendKind::General
        } else {
            BackendKind::Secure
        }
    }
}

/// 메모리 기반 설정 구현. 저장소 선택 변경은 `storage_use_fallback` 명령이 반영합니다.
pub struct RuntimeSettings {
    use_fallback_storage: RwLock<bool>,
    base_url_override: RwLock<Option<String>>,
}

impl RuntimeSettings {
    pub fn new(use_fallback_storage: bool) -> Self {
        Self {
            use_fallback_storage: RwLock::new(use_fallback_storage),
            base_url_override: RwLock::new(None),
        }
    }

    /// 값이 실제로 바뀐 경우에만 true
    pub fn set_use_fallback_storage(&self, value: bool) -> bool {
        let mut current = self.use_fallback_storage.write();
        if *current == value {
            return false;
        }
        *current = value;
        true
    }

    pub fn set_base_url_override(&self, url: Option<String>) {
        *self.base_url_override.write() = url.filter(|u| !u.trim().is_empty());
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Settings for RuntimeSettings {
    fn use_fallback_storage(&self) -> bool {
        *self.use_fallback_storage.read()
    }

    fn base_url_override(&self) -> Option<String> {
        self.base_url_override.read().clone()
    }
}

// =====================================
// 알림
// =====================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Error,
}

/// 사용자에게 보여줄 알림 `{ message, description?, type }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: NoticeKind,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// 알림 UI 가 연결되지 않은 환경용 (로그만 남김)
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        tracing::info!(kind = ?notice.kind, message = %notice.message, "user notice");
    }
}

// =====================================
// 텔레메트리
// =====================================

pub trait Telemetry: Send + Sync {
    fn capture_message(&self, message: &str);

    fn capture_error(&self, error: &(dyn std::error::Error + 'static));

    /// 파생된 사용자가 바뀔 때마다 호출 (None = 식별 해제)
    fn set_user(&self, email: Option<&str>);
}

/// tracing 으로만 기록하는 기본 구현
#[derive(Debug, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn capture_message(&self, message: &str) {
        tracing::warn!(target: "telemetry", "{}", message);
    }

    fn capture_error(&self, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(target: "telemetry", error = %error, "captured error");
    }

    fn set_user(&self, email: Option<&str>) {
        tracing::debug!(target: "telemetry", identified = email.is_some(), "telemetry user updated");
    }
}

/// 협력자 묶음
#[derive(Clone)]
pub struct Collaborators {
    pub settings: Arc<dyn Settings>,
    pub notifier: Arc<dyn Notifier>,
    pub telemetry: Arc<dyn Telemetry>,
}

impl Collaborators {
    pub fn new(settings: Arc<dyn Settings>, notifier: Arc<dyn Notifier>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            settings,
            notifier,
            telemetry,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new(
            Arc::new(RuntimeSettings::default()),
            Arc::new(LogNotifier),
            Arc::new(LogTelemetry),
        )
    }
}
