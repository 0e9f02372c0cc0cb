//! Session Error Types
//!
//! 인증 액세스 레이어 전역 에러 타입 정의
//!
//! - 레이어가 스스로 복구할 수 있는 에러(만료 토큰, 불안정한 저장소)는 호출자에게 도달하지 않습니다.
//! - 복구할 수 없는 에러는 태그가 붙은 형태(`DISCONNECTED`, `TIMEOUT`)로 정규화되어 전달됩니다.

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// 저장소 백엔드 에러
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// 세션 / HTTP 파이프라인 에러
#[derive(Error, Debug)]
pub enum SessionError {
    /// 세션이 강제로 종료됨 (로그아웃 캐스케이드 실행 후)
    #[error("{message}")]
    Disconnected { message: String },

    /// 연결 중단 / 타임아웃 (현지화된 메시지)
    #[error("{message}")]
    Timeout { message: String },

    /// 2xx 가 아닌 응답 (그대로 전달)
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl SessionError {
    /// 호출자가 분기할 수 있는 안정적인 태그
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Disconnected { .. } => "DISCONNECTED",
            SessionError::Timeout { .. } => "TIMEOUT",
            SessionError::Status { .. } => "HTTP_STATUS",
            SessionError::Transport(_) => "TRANSPORT_ERROR",
            SessionError::InvalidRequest(_) => "INVALID_REQUEST",
            SessionError::Storage(_) => "STORAGE_ERROR",
            SessionError::Serialization(_) => "SERIALIZATION_ERROR",
            SessionError::Config(_) => "CONFIG_ERROR",
        }
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, SessionError::Disconnected { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout { .. })
    }

    /// 응답 상태 코드 (Status 에러인 경우)
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SessionError::Status { status, .. } => Some(*status),
            SessionError::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// 호스트 셸 응답용 직렬화 가능한 에러
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<SessionError> for CommandError {
    fn from(error: SessionError) -> Self {
        let details = match &error {
            SessionError::Status { status, .. } => Some(status.as_u16().to_string()),
            _ => None,
        };

        CommandError {
            code: error.code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

impl From<StorageError> for CommandError {
    fn from(error: StorageError) -> Self {
        SessionError::Storage(error).into()
    }
}

/// 호스트 명령 결과 타입
pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_maps_to_tagged_command_error() {
        let err = SessionError::Disconnected {
            message: "연결이 끊어졌습니다".to_string(),
        };
        assert!(err.is_disconnected());

        let cmd: CommandError = err.into();
        assert_eq!(cmd.code, "DISCONNECTED");
        assert_eq!(cmd.message, "연결이 끊어졌습니다");
        assert!(cmd.details.is_none());
    }

    #[test]
    fn status_error_keeps_code_in_details() {
        let err = SessionError::Status {
            status: StatusCode::NOT_FOUND,
            body: "{}".to_string(),
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

        let cmd: CommandError = err.into();
        assert_eq!(cmd.code, "HTTP_STATUS");
        assert_eq!(cmd.details.as_deref(), Some("404"));
    }
}
