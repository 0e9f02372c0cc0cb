//! 자격증명 저장소
//!
//! 액세스/리프레시 토큰과 파생 사용자(`UserClaims`)의 유일한 소유자입니다.
//!
//! - `user` 는 항상 액세스 토큰에서 파생되며 독립적으로 설정되지 않습니다.
//! - 영속화되는 것은 `{ accessToken, refreshToken }` 뿐이고, `user` 는 복원 시 다시 디코딩합니다.
//! - 저장소 백엔드는 런타임에 교체될 수 있으며, 교체 시 새 백엔드로 재수화(hydration)합니다.
//!   기존 백엔드의 값은 옮기지 않습니다 (호출자가 먼저 clear 해야 함 → 재로그인).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use zeroize::Zeroize;

use crate::claims::{self, UserClaims};
use crate::collab::Telemetry;
use crate::refresh::RefreshCoordinator;
use crate::storage::{BackendKind, ResilientStorage, StorageBackend};

/// 백엔드별 영속 레코드 키
pub const AUTH_STORAGE_KEY: &str = "auth-storage";

/// 영속화 레코드 (user 는 저장하지 않음)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedTokens {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// 현재 자격증명 스냅샷
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<UserClaims>,
}

impl Credential {
    fn from_tokens(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        // 디코딩 실패 → user 없음 (에러 아님)
        let user = access_token.as_deref().and_then(claims::decode);
        Self {
            access_token,
            refresh_token,
            user,
        }
    }

    pub fn is_logged_out(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    fn wipe(&mut self) {
        self.access_token.zeroize();
        self.refresh_token.zeroize();
        self.user = None;
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user.as_ref().map(|u| &u.id))
            .finish()
    }
}

/// 수화 상태. 프로세스 시작 시 `hydrated=false`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HydrationState {
    pub hydrated: bool,
    pub backend: BackendKind,
}

/// 선택 가능한 두 백엔드
#[derive(Clone)]
pub struct StorageBackends {
    pub secure: Arc<dyn StorageBackend>,
    pub general: Arc<dyn StorageBackend>,
}

impl StorageBackends {
    pub fn new(secure: Arc<dyn StorageBackend>, general: Arc<dyn StorageBackend>) -> Self {
        Self { secure, general }
    }

    pub fn select(&self, kind: BackendKind) -> Arc<dyn StorageBackend> {
        match kind {
            BackendKind::Secure => self.secure.clone(),
            BackendKind::General => self.general.clone(),
        }
    }
}

struct StorageBinding {
    kind: BackendKind,
    storage: ResilientStorage,
}

pub struct CredentialStore {
    state: RwLock<Credential>,
    backends: StorageBackends,
    binding: RwLock<StorageBinding>,
    hydration: watch::Sender<HydrationState>,
    user_tx: watch::Sender<Option<UserClaims>>,
    telemetry: Arc<dyn Telemetry>,
    /// 토큰 변경마다 증가. 수화 도중 변경이 있었는지 판단용
    epoch: AtomicU64,
    /// 영속화 순서 보장
    persist_lock: Mutex<()>,
    expiry_leeway: i64,
}

impl CredentialStore {
    pub fn new(
        backends: StorageBackends,
        initial: BackendKind,
        telemetry: Arc<dyn Telemetry>,
        expiry_leeway: i64,
    ) -> Self {
        let storage = ResilientStorage::new(backends.select(initial), telemetry.clone());
        let (hydration, _) = watch::channel(HydrationState {
            hydrated: false,
            backend: initial,
        });
        let (user_tx, _) = watch::channel(None);

        Self {
            state: RwLock::new(Credential::default()),
            backends,
            binding: RwLock::new(StorageBinding {
                kind: initial,
                storage,
            }),
            hydration,
            user_tx,
            telemetry,
            epoch: AtomicU64::new(0),
            persist_lock: Mutex::new(()),
            expiry_leeway,
        }
    }

    // =====================================
    // 조회
    // =====================================

    pub fn snapshot(&self) -> Credential {
        self.state.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.read().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserClaims> {
        self.state.read().user.clone()
    }

    /// `exp` 가 아직 미래인 액세스 토큰 (I/O 없음)
    pub fn valid_access_token(&self) -> Option<String> {
        let now = chrono::Utc::now().timestamp();
        let state = self.state.read();
        match (&state.access_token, &state.user) {
            (Some(token), Some(user)) if user.is_valid_at(now, self.expiry_leeway) => Some(token.clone()),
            _ => None,
        }
    }

    pub fn hydration(&self) -> HydrationState {
        *self.hydration.borrow()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydration.borrow().hydrated
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.binding.read().kind
    }

    pub fn subscribe_user(&self) -> watch::Receiver<Option<UserClaims>> {
        self.user_tx.subscribe()
    }

    pub fn subscribe_hydration(&self) -> watch::Receiver<HydrationState> {
        self.hydration.subscribe()
    }

    /// `hydrated=true` 가 될 때까지 대기
    pub async fn wait_hydrated(&self) {
        let mut rx = self.hydration.subscribe();
        // sender 는 self 가 쥐고 있으므로 닫히지 않음
        let _ = rx.wait_for(|state| state.hydrated).await;
    }

    // =====================================
    // 변경
    // =====================================

    /// 두 토큰을 원자적으로 교체하고 user 를 다시 파생/발행한 뒤 영속화
    pub async fn set_tokens(&self, access_token: Option<String>, refresh_token: Option<String>) {
        self.replace(Credential::from_tokens(access_token, refresh_token));
        self.persist().await;
    }

    /// 유효한 토큰이 있으면 즉시 반환, 없으면 갱신 코디네이터에 위임 (실패 시 None)
    pub async fn get_or_refresh_access_token(&self, coordinator: &RefreshCoordinator) -> Option<String> {
        self.wait_hydrated().await;

        if let Some(token) = self.valid_access_token() {
            return Some(token);
        }

        let stale = self.access_token();
        coordinator.refresh_after(stale.as_deref()).await
    }

    /// 토큰/사용자/외부 식별 연결 모두 제거. 멱등
    pub async fn clear(&self) {
        self.replace(Credential::default());
        self.persist().await;
    }

    /// 사용자가 요청한 로그아웃. 현재는 `clear()` 와 효과가 같습니다.
    pub async fn logout(&self) {
        tracing::info!("logging out");
        self.clear().await;
    }

    fn replace(&self, next: Credential) {
        let user = next.user.clone();
        {
            let mut state = self.state.write();
            state.wipe();
            *state = next;
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.publish_user(user);
    }

    fn publish_user(&self, user: Option<UserClaims>) {
        self.telemetry
            .set_user(user.as_ref().and_then(|u| u.email.as_deref()));
        self.user_tx.send_replace(user);
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let storage = self.binding.read().storage.clone();

        // 락 안에서 최신 상태를 다시 읽어 저장 (순서 역전 방지)
        let record = {
            let state = self.state.read();
            PersistedTokens {
                access_token: state.access_token.clone(),
                refresh_token: state.refresh_token.clone(),
            }
        };

        if record.access_token.is_none() && record.refresh_token.is_none() {
            storage.remove(AUTH_STORAGE_KEY).await;
            return;
        }

        match serde_json::to_string(&record) {
            Ok(json) => storage.set(AUTH_STORAGE_KEY, &json).await,
            Err(e) => self.telemetry.capture_error(&e),
        }
    }

    // =====================================
    // 수화 / 백엔드 전환
    // =====================================

    /// 현재 백엔드에서 토큰을 읽어 메모리에 적재
    pub async fn hydrate(&self) {
        let (kind, storage) = {
            let binding = self.binding.read();
            (binding.kind, binding.storage.clone())
        };
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.hydration.send_replace(HydrationState {
            hydrated: false,
            backend: kind,
        });

        let persisted = match storage.get(AUTH_STORAGE_KEY).await {
            Some(raw) => match serde_json::from_str::<PersistedTokens>(&raw) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(backend = storage.backend_name(), error = %e, "discarding unreadable token record");
                    self.telemetry.capture_error(&e);
                    storage.remove(AUTH_STORAGE_KEY).await;
                    PersistedTokens::default()
                }
            },
            None => PersistedTokens::default(),
        };

        if self.backend_kind() != kind {
            // 수화 도중 다시 전환됨. 새 전환의 수화가 마무리합니다.
            return;
        }

        if self.epoch.load(Ordering::SeqCst) == epoch {
            let credential = Credential::from_tokens(persisted.access_token, persisted.refresh_token);
            tracing::info!(
                backend = storage.backend_name(),
                has_access_token = credential.access_token.is_some(),
                has_refresh_token = credential.refresh_token.is_some(),
                "credentials hydrated"
            );
            self.replace(credential);
        } else {
            tracing::debug!("tokens changed during hydration, keeping in-memory state");
        }

        self.hydration.send_replace(HydrationState {
            hydrated: true,
            backend: kind,
        });
    }

    /// 영속 백엔드 교체 후 새 백엔드로 재수화. 값은 이전하지 않습니다.
    pub async fn switch_backend(&self, kind: BackendKind) {
        {
            let mut binding = self.binding.write();
            if binding.kind == kind {
                return;
            }
            *binding = StorageBinding {
                kind,
                storage: ResilientStorage::new(self.backends.select(kind), self.telemetry.clone()),
            };
            self.hydration.send_replace(HydrationState {
                hydrated: false,
                backend: kind,
            });
        }

        tracing::info!(backend = ?kind, "storage backend switched, rehydrating");
        self.hydrate().await;
    }
}
