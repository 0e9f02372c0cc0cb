//! 인증 HTTP 인터셉터 파이프라인
//!
//! 요청 단계 (순서대로, 매 시도마다 다시 실행):
//! 1. 런타임 기본 URL override 적용
//! 2. 관측용 메타데이터 (request id, trace 로그)
//! 3. `Authorization: Bearer <현재 토큰>` + 앱 식별 헤더
//!
//! 응답 복구 (순서대로):
//! 1. 만료 토큰 401 → single-flight 갱신 후 1회 재시도 (인증 단계를 다시 실행해 새 토큰 사용)
//! 2. 여전히 401 이고 토큰이 있으면 로그아웃 캐스케이드 → `DISCONNECTED`
//! 3. 타임아웃 → 현지화된 `TIMEOUT`
//! 4. 나머지는 그대로 전달

pub mod client;
pub mod recovery;
pub mod stages;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::collab::Settings;
use crate::config::parse_base_url;
use crate::error::SessionError;

pub use client::ApiClient;
pub use recovery::RetryContext;
pub use stages::{AuthStage, BaseUrlStage, RequestStage, TraceStage};

pub const HEADER_APP_NAME: &str = "x-app-name";
pub const HEADER_APP_VERSION: &str = "x-app-version";
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// 파이프라인에 들어가는 요청. 직렬화 전 형태로 보관하므로 재시도 시 단계를 다시 적용할 수 있습니다.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// 기본 URL 기준 상대 경로 또는 절대 URL
    pub path: String,
    /// `BaseUrlStage` 가 채움
    pub base_url: Option<Url>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            base_url: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, SessionError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Result<Self, SessionError> {
        let value = HeaderValue::from_str(value)
            .map_err(|e| SessionError::InvalidRequest(format!("invalid header {}: {}", name, e)))?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    /// 최종 URL (기본 URL + 경로 + 쿼리)
    pub fn url(&self) -> Result<Url, SessionError> {
        let mut url = match &self.base_url {
            Some(base) => resolve_url(base, &self.path)?,
            None => Url::parse(&self.path)
                .map_err(|e| SessionError::InvalidRequest(format!("no base url for {}: {}", self.path, e)))?,
        };
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

/// 본문까지 읽은 응답
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// 경로를 기본 URL 기준으로 결합. 절대 URL 은 그대로 사용합니다.
pub fn resolve_url(base: &Url, path: &str) -> Result<Url, SessionError> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Url::parse(path).map_err(|e| SessionError::InvalidRequest(format!("invalid url {}: {}", path, e)));
    }
    // 선행 `/` 가 있으면 base 의 경로가 사라지므로 제거
    base.join(path.trim_start_matches('/'))
        .map_err(|e| SessionError::InvalidRequest(format!("invalid path {}: {}", path, e)))
}

/// 설정의 override 가 있으면 그것을, 없으면 기본값
pub fn resolve_base_url(default: &Url, settings: &dyn Settings) -> Result<Url, SessionError> {
    match settings.base_url_override() {
        Some(raw) => parse_base_url(&raw),
        None => Ok(default.clone()),
    }
}

/// 정적 앱 식별 헤더
pub fn identity_headers(app_name: &str, app_version: &str) -> Result<HeaderMap, SessionError> {
    let mut headers = HeaderMap::new();
    for (name, value) in [(HEADER_APP_NAME, app_name), (HEADER_APP_VERSION, app_version)] {
        let value = HeaderValue::from_str(value)
            .map_err(|e| SessionError::Config(format!("invalid {} header: {}", name, e)))?;
        headers.insert(HeaderName::from_static(name), value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_paths() {
        let base = parse_base_url("https://api.example.com/v2").unwrap();
        assert_eq!(
            resolve_url(&base, "/members/me").unwrap().as_str(),
            "https://api.example.com/v2/members/me"
        );
        assert_eq!(
            resolve_url(&base, "members/me").unwrap().as_str(),
            "https://api.example.com/v2/members/me"
        );
        assert_eq!(
            resolve_url(&base, "https://other.example.com/x").unwrap().as_str(),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn url_includes_query() {
        let mut request = ApiRequest::get("/bookings").query("from", "2026-01-01").query("limit", "20");
        request.base_url = Some(parse_base_url("https://api.example.com").unwrap());
        assert_eq!(
            request.url().unwrap().as_str(),
            "https://api.example.com/bookings?from=2026-01-01&limit=20"
        );
    }

    #[test]
    fn extracts_bearer_token() {
        let request = ApiRequest::get("/x").header("authorization", "Bearer abc.def").unwrap();
        assert_eq!(request.bearer_token(), Some("abc.def"));
        assert_eq!(ApiRequest::get("/x").bearer_token(), None);
    }

    #[test]
    fn identity_headers_are_set() {
        let headers = identity_headers("member-app", "1.2.3").unwrap();
        assert_eq!(headers[HEADER_APP_NAME], "member-app");
        assert_eq!(headers[HEADER_APP_VERSION], "1.2.3");
    }
}
