//! 사용자 노출 메시지 카탈로그
//!
//! UI 레이어가 전송 계층 에러를 직접 매칭하지 않도록, 파이프라인은 여기서 정의한
//! 현지화된 문구로 에러를 변환합니다.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ko,
    En,
}

impl Locale {
    /// `ko`, `ko-KR`, `en_US` 같은 태그를 파싱 (알 수 없으면 None)
    pub fn parse(tag: &str) -> Option<Self> {
        let lang = tag
            .trim()
            .split(|c: char| c == '-' || c == '_')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match lang.as_str() {
            "ko" => Some(Locale::Ko),
            "en" => Some(Locale::En),
            _ => None,
        }
    }
}

/// 메시지 키
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    Disconnected,
    DisconnectedDescription,
    Timeout,
    TimeoutDescription,
}

pub fn message(locale: Locale, key: MessageKey) -> &'static str {
    match (locale, key) {
        (Locale::Ko, MessageKey::Disconnected) => "연결이 끊어졌습니다",
        (Locale::Ko, MessageKey::DisconnectedDescription) => "세션이 만료되었습니다. 다시 로그인해 주세요.",
        (Locale::Ko, MessageKey::Timeout) => "요청 시간이 초과되었습니다",
        (Locale::Ko, MessageKey::TimeoutDescription) => "네트워크 연결을 확인한 뒤 다시 시도해 주세요.",
        (Locale::En, MessageKey::Disconnected) => "You have been disconnected",
        (Locale::En, MessageKey::DisconnectedDescription) => "Your session has expired. Please sign in again.",
        (Locale::En, MessageKey::Timeout) => "The request timed out",
        (Locale::En, MessageKey::TimeoutDescription) => "Check your network connection and try again.",
    }
}
