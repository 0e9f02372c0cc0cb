//! 응답 복구 판정
//!
//! 부수 효과 없는 판정 함수들. 실제 갱신/캐스케이드 실행은 `ApiClient` 가 합니다.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::SessionError;
use crate::http::ApiResponse;
use crate::i18n::{self, Locale, MessageKey};

/// 만료된 액세스 토큰을 뜻하는 서버 에러 코드
pub const EXPIRED_ACCESS_TOKEN: &str = "EXPIRED_ACCESS_TOKEN";

/// 요청별 재시도 상태. 요청이 끝나면 버려집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    pub had_authorization_header: bool,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryContext {
    pub fn new() -> Self {
        Self {
            had_authorization_header: false,
            attempt: 0,
            max_attempts: 1,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

impl Default for RetryContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
}

/// JSON 본문의 `code` 필드
pub fn error_code(response: &ApiResponse) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(&response.body).ok()?.code
}

/// 재시도 대상: 401 + Authorization 헤더를 실었던 요청 + JSON 본문 `code == EXPIRED_ACCESS_TOKEN`
pub fn is_expired_access_token(response: &ApiResponse, had_authorization_header: bool) -> bool {
    response.status == StatusCode::UNAUTHORIZED
        && had_authorization_header
        && error_code(response).as_deref() == Some(EXPIRED_ACCESS_TOKEN)
}

/// 캐스케이드 대상: 복구 후에도 401 이고 저장소에 토큰이 남아 있음
pub fn is_session_terminated(status: StatusCode, holds_access_token: bool) -> bool {
    status == StatusCode::UNAUTHORIZED && holds_access_token
}

pub fn disconnected_error(locale: Locale) -> SessionError {
    SessionError::Disconnected {
        message: i18n::message(locale, MessageKey::Disconnected).to_string(),
    }
}

/// 타임아웃은 현지화된 메시지로, 나머지 전송 에러는 그대로
pub fn translate_transport_error(error: reqwest::Error, locale: Locale) -> SessionError {
    if error.is_timeout() {
        SessionError::Timeout {
            message: i18n::message(locale, MessageKey::Timeout).to_string(),
        }
    } else {
        SessionError::Transport(error)
    }
}
