//! 저장소 백엔드
//!
//! 자격증명 저장소가 토큰을 영속화하는 대상. 두 가지 구현을 런타임 설정으로 전환합니다.
//!
//! - `KeychainStorage`: OS 키체인/키링 (보안 저장소)
//! - `FileStorage`: app data 디렉토리의 JSON 파일 (일반 저장소, 키체인 사용 불가 시 fallback)
//! - `MemoryStorage`: 휘발성 (테스트 / 임시 세션)
//!
//! 백엔드는 토큰을 만들거나 바꾸지 않고, 요청받은 값만 저장/복원합니다.

pub mod file;
pub mod keychain;
pub mod memory;
pub mod resilient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use file::FileStorage;
pub use keychain::KeychainStorage;
pub use memory::MemoryStorage;
pub use resilient::ResilientStorage;

/// 저장소 선택
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Secure,
    General,
}

/// 저장소 능력 인터페이스 (`get` / `set` / `remove`)
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// 로그용 이름
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
