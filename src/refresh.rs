//! 액세스 토큰 갱신 코디네이터 (single-flight)
//!
//! 동시에 들어온 갱신 요청은 하나의 네트워크 호출로 합쳐지고, 모든 호출자가 같은 결과를 봅니다.
//!
//! - 진행 중인 갱신은 `Mutex<Option<Shared<..>>>` 하나로만 표현합니다 (`is_fetching_token` == 슬롯 점유).
//! - 갱신 작업은 별도 task 로 실행되어 호출자가 모두 떠나도 끝까지 진행됩니다.
//! - 작업이 끝나면 호출자에게 결과가 전달되기 *전에* 슬롯을 비웁니다.
//!   그래야 직후의 새 호출이 이미 끝난 갱신에 합류하지 않고 새 갱신을 시작합니다.
//! - 실패는 `None` 으로 귀결되며 기존 토큰은 건드리지 않습니다. 로그아웃 판단은 호출자 몫입니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::collab::Settings;
use crate::credentials::CredentialStore;
use crate::error::SessionError;
use crate::http::{identity_headers, resolve_base_url, resolve_url};

/// 갱신 엔드포인트 응답 `{ accessToken, refreshToken }`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    /// 회전하지 않는 서버는 생략할 수 있음 (기존 값 유지)
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// 갱신 엔드포인트 협력자
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError>;
}

/// `POST {base}/{refresh_path}` 로 갱신하는 기본 구현
///
/// 인터셉터 파이프라인을 거치지 않는 별도 호출입니다 (갱신 중 재귀 방지).
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    default_base_url: Url,
    refresh_path: String,
    settings: Arc<dyn Settings>,
    app_name: String,
    app_version: String,
}

impl HttpTokenRefresher {
    pub fn new(
        http: reqwest::Client,
        default_base_url: Url,
        refresh_path: impl Into<String>,
        settings: Arc<dyn Settings>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            http,
            default_base_url,
            refresh_path: refresh_path.into(),
            settings,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SessionError> {
        let base = resolve_base_url(&self.default_base_url, self.settings.as_ref())?;
        let url = resolve_url(&base, &self.refresh_path)?;

        tracing::debug!(url = %url, "requesting token refresh");

        let response = self
            .http
            .post(url)
            .headers(identity_headers(&self.app_name, &self.app_version)?)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Status { status, body });
        }

        Ok(response.json::<TokenPair>().await?)
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

struct InFlight {
    wave: u64,
    future: RefreshFuture,
}

/// 갱신 요청 종류
enum Demand<'a> {
    /// 무조건 갱신 (또는 진행 중인 갱신에 합류)
    Always,
    /// 호출자가 본 토큰이 `stale` 일 때만. 그 사이 다른 웨이브가 새 유효 토큰을 넣었으면 그것을 사용
    After(Option<&'a str>),
}

pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    waves: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            in_flight: Arc::new(Mutex::new(None)),
            waves: AtomicU64::new(0),
        }
    }

    /// 진행 중인 갱신이 있는지 (`isFetchingToken`)
    pub fn is_fetching_token(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// 지금까지 시작된 갱신 웨이브 수
    pub fn waves_started(&self) -> u64 {
        self.waves.load(Ordering::SeqCst)
    }

    /// 새 액세스 토큰 요청. 진행 중인 갱신이 있으면 같은 결과를 공유합니다.
    pub async fn refresh_access_token(&self) -> Option<String> {
        self.join_or_start(Demand::Always).await
    }

    /// `stale` 토큰이 거부된 뒤의 갱신 요청.
    ///
    /// 슬롯 락 안에서 다시 확인하여, 그 사이 끝난 웨이브가 다른 유효 토큰을 설치했다면
    /// 네트워크 호출 없이 그 토큰을 돌려줍니다.
    pub async fn refresh_after(&self, stale: Option<&str>) -> Option<String> {
        self.join_or_start(Demand::After(stale)).await
    }

    async fn join_or_start(&self, demand: Demand<'_>) -> Option<String> {
        let future = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(in_flight) => {
                    tracing::debug!(wave = in_flight.wave, "joining in-flight token refresh");
                    in_flight.future.clone()
                }
                None => {
                    if let Demand::After(stale) = demand {
                        if let Some(current) = self.store.valid_access_token() {
                            if stale != Some(current.as_str()) {
                                return Some(current);
                            }
                        }
                    }

                    let wave = self.waves.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = self.start(wave);
                    *slot = Some(InFlight {
                        wave,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        future.await
    }

    fn start(&self, wave: u64) -> RefreshFuture {
        let store = self.store.clone();
        let refresher = self.refresher.clone();
        let slot = self.in_flight.clone();

        tracing::info!(wave, "starting token refresh");

        let task = tokio::spawn(async move {
            let result = run_refresh(&store, refresher.as_ref()).await;

            {
                let mut slot = slot.lock();
                if slot.as_ref().map(|f| f.wave) == Some(wave) {
                    *slot = None;
                }
            }

            tracing::info!(wave, success = result.is_some(), "token refresh settled");
            result
        });

        task.map(|joined| match joined {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "token refresh task failed");
                None
            }
        })
        .boxed()
        .shared()
    }
}

async fn run_refresh(store: &CredentialStore, refresher: &dyn TokenRefresher) -> Option<String> {
    let Some(refresh_token) = store.refresh_token() else {
        tracing::warn!("no refresh token available, skipping refresh");
        return None;
    };

    match refresher.refresh(&refresh_token).await {
        Ok(pair) => {
            let next_refresh = pair.refresh_token.or(Some(refresh_token));
            store
                .set_tokens(Some(pair.access_token.clone()), next_refresh)
                .await;
            Some(pair.access_token)
        }
        Err(e) => {
            // 기존 토큰은 그대로 둠 (clear 여부는 파이프라인이 결정)
            tracing::warn!(code = e.code(), error = %e, "token refresh failed");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// 호출 횟수를 세고, 지연 후 고정 결과를 돌려주는 refresher
    pub struct ScriptedRefresher {
        pub calls: AtomicUsize,
        pub delay: Duration,
        pub access_token: Option<String>,
    }

    impl ScriptedRefresher {
        pub fn succeeding(access_token: String, delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                access_token: Some(access_token),
            }
        }

        pub fn failing(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay,
                access_token: None,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for ScriptedRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenPair, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.access_token {
                Some(token) => Ok(TokenPair {
                    access_token: token.clone(),
                    refresh_token: Some("rotated-refresh".to_string()),
                }),
                None => Err(SessionError::Status {
                    status: reqwest::StatusCode::UNAUTHORIZED,
                    body: r#"{"code":"INVALID_REFRESH_TOKEN"}"#.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::ScriptedRefresher;
    use super::*;
    use crate::claims::testing::token_expiring_in;
    use crate::collab::LogTelemetry;
    use crate::credentials::StorageBackends;
    use crate::storage::{BackendKind, MemoryStorage};

    async fn hydrated_store() -> Arc<CredentialStore> {
        let store = Arc::new(CredentialStore::new(
            StorageBackends::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new())),
            BackendKind::Secure,
            Arc::new(LogTelemetry),
            0,
        ));
        store.hydrate().await;
        store
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() {
        let store = hydrated_store().await;
        store
            .set_tokens(Some(token_expiring_in("u", -10)), Some("r".to_string()))
            .await;

        let fresh = token_expiring_in("u", 600);
        let refresher = Arc::new(ScriptedRefresher::succeeding(fresh.clone(), Duration::from_millis(100)));
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), refresher.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let coordinator = coordinator.clone();
                tokio::spawn(async move { store.get_or_refresh_access_token(&coordinator).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(fresh.clone()));
        }
        assert_eq!(refresher.calls(), 1);
        assert_eq!(coordinator.waves_started(), 1);
        assert!(!coordinator.is_fetching_token());
        assert_eq!(store.refresh_token().as_deref(), Some("rotated-refresh"));
        assert_eq!(store.user().unwrap().id, "u");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_all_see_failure() {
        let store = hydrated_store().await;
        let expired = token_expiring_in("u", -10);
        store.set_tokens(Some(expired.clone()), Some("r".to_string())).await;

        let refresher = Arc::new(ScriptedRefresher::failing(Duration::from_millis(50)));
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), refresher.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.refresh_access_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), None);
        }
        assert_eq!(refresher.calls(), 1);
        // 실패해도 기존 토큰은 유지
        assert_eq!(store.access_token(), Some(expired));
        assert_eq!(store.refresh_token().as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn valid_token_needs_no_refresh() {
        let store = hydrated_store().await;
        let token = token_expiring_in("u", 600);
        store.set_tokens(Some(token.clone()), Some("r".to_string())).await;

        let refresher = Arc::new(ScriptedRefresher::failing(Duration::ZERO));
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        assert_eq!(store.get_or_refresh_access_token(&coordinator).await, Some(token));
        assert_eq!(refresher.calls(), 0);
        assert!(!coordinator.is_fetching_token());
    }

    #[tokio::test]
    async fn token_with_sub_and_id_is_served_without_refresh() {
        let store = hydrated_store().await;
        let token = crate::claims::testing::token_with(serde_json::json!({
            "sub": "abc",
            "id": "abc",
            "email": "a@x.io",
            "exp": chrono::Utc::now().timestamp() + 600,
        }));
        store.set_tokens(Some(token.clone()), Some("r".to_string())).await;

        let refresher = Arc::new(ScriptedRefresher::failing(Duration::ZERO));
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        assert_eq!(store.user().unwrap().id, "abc");
        assert_eq!(store.get_or_refresh_access_token(&coordinator).await, Some(token));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn call_after_settlement_starts_new_wave() {
        let store = hydrated_store().await;
        store.set_tokens(Some(token_expiring_in("u", -10)), Some("r".to_string())).await;

        let refresher = Arc::new(ScriptedRefresher::succeeding(token_expiring_in("u", 600), Duration::ZERO));
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        assert!(coordinator.refresh_access_token().await.is_some());
        assert!(!coordinator.is_fetching_token());
        assert!(coordinator.refresh_access_token().await.is_some());

        assert_eq!(refresher.calls(), 2);
        assert_eq!(coordinator.waves_started(), 2);
    }

    #[tokio::test]
    async fn refresh_after_stale_reuses_newer_token() {
        let store = hydrated_store().await;
        let fresh = token_expiring_in("u", 600);
        store.set_tokens(Some(fresh.clone()), Some("r".to_string())).await;

        let refresher = Arc::new(ScriptedRefresher::failing(Duration::ZERO));
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        assert_eq!(coordinator.refresh_after(Some("older-token")).await, Some(fresh.clone()));
        assert_eq!(refresher.calls(), 0);

        // 거부된 토큰이 현재 토큰이면 실제로 갱신 시도
        assert_eq!(coordinator.refresh_after(Some(fresh.as_str())).await, None);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn missing_refresh_token_resolves_none_without_network() {
        let store = hydrated_store().await;
        store.set_tokens(Some(token_expiring_in("u", -10)), None).await;

        let refresher = Arc::new(ScriptedRefresher::succeeding(token_expiring_in("u", 600), Duration::ZERO));
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        assert_eq!(coordinator.refresh_access_token().await, None);
        assert_eq!(refresher.calls(), 0);
        assert!(!coordinator.is_fetching_token());
    }

    #[tokio::test]
    async fn refresh_completes_even_if_callers_go_away() {
        let store = hydrated_store().await;
        store.set_tokens(Some(token_expiring_in("u", -10)), Some("r".to_string())).await;

        let fresh = token_expiring_in("u", 600);
        let refresher = Arc::new(ScriptedRefresher::succeeding(fresh.clone(), Duration::from_millis(50)));
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        let abandoned = tokio::time::timeout(Duration::from_millis(5), coordinator.refresh_access_token()).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.access_token(), Some(fresh));
        assert!(!coordinator.is_fetching_token());
    }
}
