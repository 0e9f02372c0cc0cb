//! App Session - 인증 HTTP 접근 계층
//!
//! 자격증명 저장소, single-flight 토큰 갱신, 인증 인터셉터 파이프라인(만료 재시도/로그아웃 캐스케이드),
//! 런타임 전환 가능한 저장소 백엔드(키체인/파일)를 제공합니다.

pub mod claims;
pub mod collab;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod i18n;
pub mod logging;
pub mod refresh;
pub mod session;
pub mod storage;

pub use claims::UserClaims;
pub use collab::{Collaborators, Notice, NoticeKind, Notifier, RuntimeSettings, Settings, Telemetry};
pub use config::AppConfig;
pub use credentials::{Credential, CredentialStore, HydrationState, StorageBackends};
pub use error::{CommandError, CommandResult, SessionError, StorageError};
pub use http::{ApiClient, ApiRequest, ApiResponse};
pub use i18n::Locale;
pub use refresh::{HttpTokenRefresher, RefreshCoordinator, TokenPair, TokenRefresher};
pub use session::{Session, SessionBuilder, SessionStatus};
pub use storage::{BackendKind, StorageBackend};

/// 앱 시작 시 1회 호출: 설정(`.env` 포함) → 로깅 → 세션 조립 및 수화
pub async fn bootstrap(collaborators: Collaborators) -> Result<Session, SessionError> {
    let config = AppConfig::from_env()?;

    if !logging::init_tracing(&config) {
        tracing::debug!("tracing subscriber already installed");
    }
    tracing::info!(
        app = %config.app_name,
        version = %config.app_version,
        base_url = %config.api_base_url,
        "starting session layer"
    );

    Session::builder(config).collaborators(collaborators).build().await
}
