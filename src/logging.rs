//! tracing 구독자 초기화
//!
//! `RUST_LOG` 가 있으면 우선, 없으면 설정의 `log_level` 을 사용합니다.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;

/// 전역 구독자 설치. 이미 설치되어 있으면 false (테스트에서 여러 번 호출해도 안전)
pub fn init_tracing(config: &AppConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("app_session={}", config.log_level)));

    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = if config.log_json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(json = config.log_json, level = %config.log_level, "tracing initialized");
    }
    installed
}
