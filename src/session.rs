//! 세션 조립
//!
//! 설정 → 저장소 백엔드 → 자격증명 저장소 → 갱신 코디네이터 → API 클라이언트 순으로 엮고
//! 시작 시 1회 수화합니다. 전역 싱글톤 대신 이 값을 주입해서 사용합니다.

use std::sync::Arc;

use serde::Serialize;

use crate::claims::UserClaims;
use crate::collab::Collaborators;
use crate::config::AppConfig;
use crate::credentials::{CredentialStore, HydrationState, StorageBackends};
use crate::error::SessionError;
use crate::http::stages::default_stages;
use crate::http::ApiClient;
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, TokenRefresher};
use crate::storage::{BackendKind, FileStorage, KeychainStorage};

/// 호스트에 보여줄 세션 상태
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub hydrated: bool,
    pub backend: BackendKind,
    pub logged_in: bool,
    pub is_fetching_token: bool,
    pub user: Option<UserClaims>,
}

pub struct SessionBuilder {
    config: AppConfig,
    collaborators: Collaborators,
    backends: Option<StorageBackends>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl SessionBuilder {
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// 기본값: 키체인(보안) + app data 디렉토리 JSON 파일(일반)
    pub fn backends(mut self, backends: StorageBackends) -> Self {
        self.backends = Some(backends);
        self
    }

    /// 기본값: `HttpTokenRefresher`
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub async fn build(self) -> Result<Session, SessionError> {
        let Self {
            config,
            collaborators,
            backends,
            refresher,
        } = self;

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.request_timeout)
            .build()?;

        let backends = match backends {
            Some(backends) => backends,
            None => StorageBackends::new(
                Arc::new(KeychainStorage::new(config.keychain_service.clone())),
                Arc::new(FileStorage::in_dir(&config.data_dir)),
            ),
        };

        let store = Arc::new(CredentialStore::new(
            backends,
            collaborators.settings.backend_kind(),
            collaborators.telemetry.clone(),
            config.expiry_leeway,
        ));

        let refresher: Arc<dyn TokenRefresher> = match refresher {
            Some(refresher) => refresher,
            None => Arc::new(HttpTokenRefresher::new(
                http.clone(),
                config.api_base_url.clone(),
                config.refresh_path.clone(),
                collaborators.settings.clone(),
                config.app_name.clone(),
                config.app_version.clone(),
            )),
        };
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), refresher));

        let stages = default_stages(
            config.api_base_url.clone(),
            collaborators.settings.clone(),
            store.clone(),
            &config.app_name,
            &config.app_version,
        );
        let api = ApiClient::new(
            http,
            stages,
            store.clone(),
            coordinator.clone(),
            collaborators.notifier.clone(),
            config.locale,
        );

        store.hydrate().await;
        tracing::info!(
            backend = ?store.backend_kind(),
            logged_in = store.access_token().is_some(),
            "session ready"
        );

        Ok(Session {
            config,
            collaborators,
            store,
            coordinator,
            api,
        })
    }
}

pub struct Session {
    config: AppConfig,
    collaborators: Collaborators,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    api: ApiClient,
}

impl Session {
    pub fn builder(config: AppConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            collaborators: Collaborators::default(),
            backends: None,
            refresher: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn user(&self) -> Option<UserClaims> {
        self.store.user()
    }

    pub fn hydration(&self) -> HydrationState {
        self.store.hydration()
    }

    /// 로그인 화면에서 받은 토큰 설치
    pub async fn login(&self, access_token: String, refresh_token: String) {
        self.store.set_tokens(Some(access_token), Some(refresh_token)).await;
        tracing::info!(user = ?self.store.user().map(|u| u.id), "logged in");
    }

    pub async fn logout(&self) {
        self.store.logout().await;
    }

    /// 유효한 액세스 토큰 (필요 시 single-flight 갱신)
    pub async fn access_token(&self) -> Option<String> {
        self.store.get_or_refresh_access_token(&self.coordinator).await
    }

    /// 설정의 저장소 선택을 반영. 바뀌었으면 자격증명을 지우고 새 백엔드로 재수화합니다 (재로그인 필요).
    ///
    /// 반환값: 전환이 일어났는지
    pub async fn sync_storage_backend(&self) -> bool {
        let wanted = self.collaborators.settings.backend_kind();
        if wanted == self.store.backend_kind() {
            return false;
        }

        self.store.clear().await;
        self.store.switch_backend(wanted).await;
        true
    }

    pub fn status(&self) -> SessionStatus {
        let hydration = self.store.hydration();
        let credential = self.store.snapshot();
        SessionStatus {
            hydrated: hydration.hydrated,
            backend: hydration.backend,
            logged_in: credential.access_token.is_some(),
            is_fetching_token: self.coordinator.is_fetching_token(),
            user: credential.user,
        }
    }
}
