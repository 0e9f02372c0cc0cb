//! 액세스 토큰(JWT) 클레임 디코딩
//!
//! 서명 검증은 서버의 몫이므로 여기서는 payload 세그먼트만 base64url 디코딩합니다.
//! 디코딩 실패는 에러가 아니라 `None` (사용자 없음) 으로 취급합니다.

use std::collections::BTreeSet;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};

/// 디코딩된 JWT payload. 액세스 토큰이 바뀔 때마다 통째로 교체됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// 만료 시각 (epoch seconds)
    pub exp: i64,
}

impl UserClaims {
    /// `exp` 가 `now + leeway` 보다 엄격히 미래인지
    pub fn is_valid_at(&self, now: i64, leeway: i64) -> bool {
        self.exp > now + leeway
    }

    pub fn is_expired(&self, leeway: i64) -> bool {
        !self.is_valid_at(chrono::Utc::now().timestamp(), leeway)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// JWT 문자열에서 클레임 추출. 형식이 잘못되었으면 None
pub fn decode(token: &str) -> Option<UserClaims> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    // 일부 발급자는 padding 을 붙이므로 제거 후 디코딩
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<RawClaims>(&bytes).ok()?.into_claims()
}

/// 발급자마다 `id` / `sub` 중 하나 또는 둘 다를 싣습니다. `id` 우선
#[derive(Deserialize)]
struct RawClaims {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    roles: BTreeSet<String>,
    #[serde(default)]
    capabilities: BTreeSet<String>,
    exp: i64,
}

impl RawClaims {
    fn into_claims(self) -> Option<UserClaims> {
        Some(UserClaims {
            id: self.id.or(self.sub)?,
            email: self.email,
            name: self.name,
            roles: self.roles,
            capabilities: self.capabilities,
            exp: self.exp,
        })
    }
}

/// 토큰 자체가 아직 유효한지 (디코딩 불가 토큰은 만료로 취급)
pub fn is_token_valid(token: &str, leeway: i64) -> bool {
    decode(token)
        .map(|claims| !claims.is_expired(leeway))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// 테스트용 서명 없는 JWT 생성
    pub fn token_with(claims: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{}.{}.signature", header, payload)
    }

    pub fn token_expiring_in(id: &str, secs: i64) -> String {
        token_with(serde_json::json!({
            "id": id,
            "email": format!("{}@example.com", id),
            "name": "Test User",
            "roles": ["member"],
            "capabilities": ["booking:create"],
            "exp": chrono::Utc::now().timestamp() + secs,
        }))
    }
}
