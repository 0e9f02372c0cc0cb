//! Host Commands
//!
//! 앱 셸(프론트엔드 브리지)에서 호출하는 명령. 결과는 직렬화 가능한 `CommandResult` 입니다.

use serde::Deserialize;

use crate::collab::RuntimeSettings;
use crate::error::{CommandError, CommandResult};
use crate::session::{Session, SessionStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArgs {
    pub access_token: String,
    pub refresh_token: String,
}

fn validate_token(name: &str, value: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError {
            code: "INVALID_TOKEN".to_string(),
            message: format!("{} must not be empty.", name),
            details: None,
        });
    }
    Ok(())
}

pub fn session_status(session: &Session) -> CommandResult<SessionStatus> {
    Ok(session.status())
}

pub async fn session_login(session: &Session, args: LoginArgs) -> CommandResult<SessionStatus> {
    validate_token("accessToken", &args.access_token)?;
    validate_token("refreshToken", &args.refresh_token)?;

    session.login(args.access_token, args.refresh_token).await;
    Ok(session.status())
}

pub async fn session_logout(session: &Session) -> CommandResult<()> {
    session.logout().await;
    Ok(())
}

/// 유효한 액세스 토큰 (필요 시 갱신). 갱신 실패 시 None
pub async fn session_access_token(session: &Session) -> CommandResult<Option<String>> {
    Ok(session.access_token().await)
}

/// 일반(fallback) 저장소 사용 여부 변경. 실제로 바뀌면 로그아웃 후 재수화됩니다.
pub async fn storage_use_fallback(
    session: &Session,
    settings: &RuntimeSettings,
    enabled: bool,
) -> CommandResult<SessionStatus> {
    if settings.set_use_fallback_storage(enabled) {
        session.sync_storage_backend().await;
    }
    Ok(session.status())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::claims::testing::token_expiring_in;
    use crate::collab::{Collaborators, LogNotifier, LogTelemetry};
    use crate::config::AppConfig;
    use crate::credentials::StorageBackends;
    use crate::refresh::testing::ScriptedRefresher;
    use crate::storage::{BackendKind, MemoryStorage};

    async fn session(settings: Arc<RuntimeSettings>) -> Session {
        Session::builder(AppConfig::default())
            .collaborators(Collaborators::new(settings, Arc::new(LogNotifier), Arc::new(LogTelemetry)))
            .backends(StorageBackends::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new())))
            .refresher(Arc::new(ScriptedRefresher::failing(Duration::ZERO)))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn login_rejects_empty_tokens() {
        let session = session(Arc::new(RuntimeSettings::default())).await;
        let err = session_login(
            &session,
            LoginArgs {
                access_token: " ".to_string(),
                refresh_token: "r".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn login_then_logout() {
        let session = session(Arc::new(RuntimeSettings::default())).await;
        let status = session_login(
            &session,
            LoginArgs {
                access_token: token_expiring_in("u", 600),
                refresh_token: "r".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(status.logged_in);
        assert_eq!(status.user.unwrap().id, "u");

        session_logout(&session).await.unwrap();
        assert!(!session_status(&session).unwrap().logged_in);
    }

    #[tokio::test]
    async fn switching_to_fallback_forces_relogin() {
        let settings = Arc::new(RuntimeSettings::default());
        let session = session(settings.clone()).await;
        session.login(token_expiring_in("u", 600), "r".to_string()).await;

        let status = storage_use_fallback(&session, &settings, true).await.unwrap();

        assert_eq!(status.backend, BackendKind::General);
        assert!(status.hydrated);
        assert!(!status.logged_in);
    }
}
