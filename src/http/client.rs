//! 인증 API 클라이언트
//!
//! 요청 단계를 적용해 보내고, 응답 복구 규칙(만료 토큰 재시도 → 로그아웃 캐스케이드 →
//! 타임아웃 변환 → 그대로 전달)을 순서대로 적용합니다.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::collab::{Notice, NoticeKind, Notifier};
use crate::credentials::CredentialStore;
use crate::error::SessionError;
use crate::http::recovery::{self, RetryContext};
use crate::http::stages::RequestStage;
use crate::http::{ApiRequest, ApiResponse};
use crate::i18n::{self, Locale, MessageKey};
use crate::refresh::RefreshCoordinator;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    stages: Arc<Vec<Box<dyn RequestStage>>>,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    notifier: Arc<dyn Notifier>,
    locale: Locale,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        stages: Vec<Box<dyn RequestStage>>,
        store: Arc<CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
        notifier: Arc<dyn Notifier>,
        locale: Locale,
    ) -> Self {
        Self {
            http,
            stages: Arc::new(stages),
            store,
            coordinator,
            notifier,
            locale,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, SessionError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, SessionError> {
        self.send(ApiRequest::delete(path)).await
    }

    /// 요청 전송. 2xx 가 아니면 에러 (복구 가능한 경우는 내부에서 처리)
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let mut ctx = RetryContext::new();

        loop {
            // 매 시도마다 원본에서 다시 준비 → 재시도는 갱신된 토큰을 실음
            let prepared = self.prepare(&request)?;
            ctx.had_authorization_header = prepared.headers.contains_key(reqwest::header::AUTHORIZATION);
            let sent_token = prepared.bearer_token().map(str::to_string);

            let url = prepared.url()?;

            let response = match self.dispatch(&prepared, url).await {
                Ok(response) => response,
                Err(e) => return Err(self.on_transport_error(e)),
            };

            if response.status.is_success() {
                return Ok(response);
            }

            if recovery::is_expired_access_token(&response, ctx.had_authorization_header) && ctx.can_retry() {
                ctx.attempt += 1;
                tracing::debug!(path = %request.path, attempt = ctx.attempt, "access token expired, refreshing");
                if self.coordinator.refresh_after(sent_token.as_deref()).await.is_some() {
                    continue;
                }
            }

            if recovery::is_session_terminated(response.status, self.store.access_token().is_some()) {
                return Err(self.logout_cascade().await);
            }

            return Err(SessionError::Status {
                status: response.status,
                body: response.text(),
            });
        }
    }

    fn prepare(&self, request: &ApiRequest) -> Result<ApiRequest, SessionError> {
        let mut prepared = request.clone();
        for stage in self.stages.iter() {
            stage.apply(&mut prepared).map_err(|e| {
                tracing::warn!(stage = stage.name(), error = %e, "request stage rejected request");
                e
            })?;
        }
        Ok(prepared)
    }

    async fn dispatch(&self, request: &ApiRequest, url: Url) -> Result<ApiResponse, reqwest::Error> {
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        tracing::debug!(status = status.as_u16(), bytes = body.len(), "api response");
        Ok(ApiResponse { status, headers, body })
    }

    fn on_transport_error(&self, error: reqwest::Error) -> SessionError {
        let translated = recovery::translate_transport_error(error, self.locale);
        if translated.is_timeout() {
            self.notifier.notify(Notice {
                message: translated.to_string(),
                description: Some(i18n::message(self.locale, MessageKey::TimeoutDescription).to_string()),
                kind: NoticeKind::Error,
            });
        }
        translated
    }

    /// 세션 종료 처리: 로그아웃 → 사용자 알림 → `DISCONNECTED`
    async fn logout_cascade(&self) -> SessionError {
        tracing::warn!("session rejected after recovery, forcing logout");
        self.store.logout().await;

        let error = recovery::disconnected_error(self.locale);
        self.notifier.notify(Notice {
            message: error.to_string(),
            description: Some(i18n::message(self.locale, MessageKey::DisconnectedDescription).to_string()),
            kind: NoticeKind::Error,
        });
        error
    }
}
