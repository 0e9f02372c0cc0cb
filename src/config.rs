//! 애플리케이션 설정
//!
//! `.env.local` → `.env` 순서로 dotenvy 로드 후 `APP_SESSION_*` 환경 변수를 읽습니다.
//! 파일이 없어도 실패하지 않습니다 (production 에서는 보통 없음).

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::SessionError;
use crate::i18n::Locale;

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";
const DEFAULT_KEYCHAIN_SERVICE: &str = "com.oddeyes.session";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API 기본 URL (런타임 override 는 `RuntimeSettings` 가 담당)
    pub api_base_url: Url,
    /// 토큰 갱신 엔드포인트 경로
    pub refresh_path: String,
    pub app_name: String,
    pub app_version: String,
    pub request_timeout: Duration,
    /// 만료 판정 여유 시간 (초). 0 이면 `exp > now` 엄격 비교
    pub expiry_leeway: i64,
    pub keychain_service: String,
    /// 일반 저장소 파일 위치
    pub data_dir: PathBuf,
    pub locale: Locale,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            app_name: env!("CARGO_PKG_NAME").to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            expiry_leeway: 0,
            keychain_service: DEFAULT_KEYCHAIN_SERVICE.to_string(),
            data_dir: std::env::temp_dir().join("app-session"),
            locale: Locale::default(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl AppConfig {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Result<Self, SessionError> {
        load_env_files();

        let mut config = Self::default();

        if let Some(raw) = var("APP_SESSION_API_BASE_URL") {
            config.api_base_url = parse_base_url(&raw)?;
        }
        if let Some(path) = var("APP_SESSION_REFRESH_PATH") {
            config.refresh_path = path;
        }
        if let Some(name) = var("APP_SESSION_APP_NAME") {
            config.app_name = name;
        }
        if let Some(version) = var("APP_SESSION_APP_VERSION") {
            config.app_version = version;
        }
        if let Some(raw) = var("APP_SESSION_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .map_err(|_| SessionError::Config(format!("APP_SESSION_TIMEOUT_SECS is not a number: {}", raw)))?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = var("APP_SESSION_EXPIRY_LEEWAY_SECS") {
            config.expiry_leeway = raw.parse().map_err(|_| {
                SessionError::Config(format!("APP_SESSION_EXPIRY_LEEWAY_SECS is not a number: {}", raw))
            })?;
        }
        if let Some(service) = var("APP_SESSION_KEYCHAIN_SERVICE") {
            config.keychain_service = service;
        }
        if let Some(dir) = var("APP_SESSION_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(tag) = var("APP_SESSION_LOCALE") {
            config.locale = Locale::parse(&tag)
                .ok_or_else(|| SessionError::Config(format!("Unsupported locale: {}", tag)))?;
        }
        if let Some(level) = var("APP_SESSION_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(raw) = var("APP_SESSION_LOG_JSON") {
            config.log_json = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, raw: &str) -> Result<Self, SessionError> {
        self.api_base_url = parse_base_url(raw)?;
        Ok(self)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 정적 앱 식별 User-Agent (`{app_name}/{app_version}`)
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.app_name, self.app_version)
    }
}

/// 기본 URL 파싱. 경로 결합 시 마지막 세그먼트가 날아가지 않도록 끝에 `/` 를 보장합니다.
pub fn parse_base_url(raw: &str) -> Result<Url, SessionError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    Url::parse(&normalized).map_err(|e| SessionError::Config(format!("Invalid base url {}: {}", raw, e)))
}

/// 비어있는 값은 설정되지 않은 것으로 간주
fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn load_env_files() {
    // CWD 기준 우선, 없으면 상위 디렉토리로 올라가며 탐색
    if dotenvy::from_filename(".env.local").is_err() {
        if let Some(path) = std::env::current_dir()
            .ok()
            .and_then(|cwd| find_upwards(&cwd, ".env.local", 6))
        {
            let _ = dotenvy::from_path(&path);
        }
    }
    let _ = dotenvy::dotenv();
}

fn find_upwards(start: &Path, filename: &str, max_hops: usize) -> Option<PathBuf> {
    start
        .ancestors()
        .take(max_hops + 1)
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.exists())
}
