//! 재시도 / 방어적 복원 래퍼
//!
//! - `get`: 일시적 실패 시 최대 3회 시도. 모두 실패하면 텔레메트리에 보고하고
//!   (손상/접근 불가로 추정되는) 키를 삭제한 뒤 `None` 반환.
//!   저장소 실패는 "로그아웃 상태" 로 강등될 뿐, 로딩 상태에 갇히지 않습니다.
//! - `set` / `remove`: best-effort. 실패는 보고만 하고 호출자에게 전파하지 않습니다.
//! - 모든 백엔드 호출은 `op_timeout` 으로 제한됩니다. 응답 없는 읽기(잠긴 키체인 등)는 실패한 시도로 셉니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::collab::Telemetry;
use crate::error::StorageError;
use crate::storage::StorageBackend;

pub const DEFAULT_READ_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ResilientStorage {
    inner: Arc<dyn StorageBackend>,
    telemetry: Arc<dyn Telemetry>,
    max_attempts: u32,
    retry_delay: Duration,
    op_timeout: Duration,
}

impl ResilientStorage {
    pub fn new(inner: Arc<dyn StorageBackend>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            inner,
            telemetry,
            max_attempts: DEFAULT_READ_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.name()
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Unavailable(format!(
                "{} {} timed out after {:?}",
                self.inner.name(),
                op,
                self.op_timeout
            ))),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.bounded("get", self.inner.get(key)).await {
                Ok(value) => return value,
                Err(e) if attempt < self.max_attempts => {
                    tracing::warn!(
                        backend = self.inner.name(),
                        key,
                        attempt,
                        error = %e,
                        "storage read failed, retrying"
                    );
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        backend = self.inner.name(),
                        key,
                        attempts = attempt,
                        error = %e,
                        "storage read failed, dropping key"
                    );
                    self.telemetry.capture_error(&e);
                    if let Err(remove_err) = self.bounded("remove", self.inner.remove(key)).await {
                        self.telemetry.capture_error(&remove_err);
                    }
                    return None;
                }
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.bounded("set", self.inner.set(key, value)).await {
            tracing::warn!(backend = self.inner.name(), key, error = %e, "storage write failed");
            self.telemetry.capture_error(&e);
        }
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.bounded("remove", self.inner.remove(key)).await {
            tracing::warn!(backend = self.inner.name(), key, error = %e, "storage remove failed");
            self.telemetry.capture_error(&e);
        }
    }
}
