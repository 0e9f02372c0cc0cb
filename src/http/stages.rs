//! 요청 변환 단계
//!
//! 각 단계는 요청을 고쳐 쓰거나 에러로 단락시킬 수 있습니다.
//! 단계는 원본 요청의 복사본에 매 시도마다 다시 적용되므로, 재시도 요청은 항상 그 시점의 토큰을 싣습니다.

use std::sync::Arc;

use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use url::Url;

use crate::collab::Settings;
use crate::credentials::CredentialStore;
use crate::error::SessionError;
use crate::http::{identity_headers, resolve_base_url, ApiRequest, HEADER_REQUEST_ID};

pub trait RequestStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, request: &mut ApiRequest) -> Result<(), SessionError>;
}

/// 1. 런타임 기본 URL override
pub struct BaseUrlStage {
    default_base_url: Url,
    settings: Arc<dyn Settings>,
}

impl BaseUrlStage {
    pub fn new(default_base_url: Url, settings: Arc<dyn Settings>) -> Self {
        Self {
            default_base_url,
            settings,
        }
    }
}

impl RequestStage for BaseUrlStage {
    fn name(&self) -> &'static str {
        "base_url"
    }

    fn apply(&self, request: &mut ApiRequest) -> Result<(), SessionError> {
        request.base_url = Some(resolve_base_url(&self.default_base_url, self.settings.as_ref())?);
        Ok(())
    }
}

/// 2. 관측 메타데이터 (제어 효과 없음)
pub struct TraceStage;

impl RequestStage for TraceStage {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn apply(&self, request: &mut ApiRequest) -> Result<(), SessionError> {
        let request_id = match request.headers.get(HEADER_REQUEST_ID) {
            Some(existing) => existing.to_str().unwrap_or_default().to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    request.headers.insert(HeaderName::from_static(HEADER_REQUEST_ID), value);
                }
                id
            }
        };

        tracing::debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            has_body = request.body.is_some(),
            "api request"
        );
        if let Some(body) = &request.body {
            tracing::trace!(request_id = %request_id, body = %body, "api request body");
        }
        Ok(())
    }
}

/// 3. Bearer 토큰 + 앱 식별 헤더
///
/// 토큰은 보내는 시점의 *현재* 값을 읽기만 하고 갱신하지 않습니다.
pub struct AuthStage {
    store: Arc<CredentialStore>,
    app_name: String,
    app_version: String,
}

impl AuthStage {
    pub fn new(store: Arc<CredentialStore>, app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            store,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

impl RequestStage for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn apply(&self, request: &mut ApiRequest) -> Result<(), SessionError> {
        if let Some(token) = self.store.access_token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| SessionError::InvalidRequest(format!("invalid access token header: {}", e)))?;
            request.headers.insert(AUTHORIZATION, value);
        }
        request
            .headers
            .extend(identity_headers(&self.app_name, &self.app_version)?);
        Ok(())
    }
}

/// 기본 순서의 단계 목록
pub fn default_stages(
    default_base_url: Url,
    settings: Arc<dyn Settings>,
    store: Arc<CredentialStore>,
    app_name: &str,
    app_version: &str,
) -> Vec<Box<dyn RequestStage>> {
    vec![
        Box::new(BaseUrlStage::new(default_base_url, settings)),
        Box::new(TraceStage),
        Box::new(AuthStage::new(store, app_name, app_version)),
    ]
}
