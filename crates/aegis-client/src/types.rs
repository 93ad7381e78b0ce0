//! Session and wire types shared by the auth flow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Role names as the API spells them. Unknown names are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Supervisor,
    SafetyOfficer,
    Worker,
    #[serde(untagged)]
    Other(String),
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "admin",
            Self::Supervisor => "supervisor",
            Self::SafetyOfficer => "safety_officer",
            Self::Worker => "worker",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(match raw.trim() {
            "admin" => Self::Admin,
            "supervisor" => Self::Supervisor,
            "safety_officer" => Self::SafetyOfficer,
            "worker" => Self::Worker,
            other => Self::Other(other.to_string()),
        })
    }
}

impl PartialEq<&str> for UserRole {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Cached projection of the signed-in identity.
///
/// Only drives UI affordances (which actions to offer). The server re-checks
/// the role on every mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl SessionUser {
    pub fn has_role(&self, roles: &[UserRole]) -> bool {
        roles.contains(&self.role)
    }

    pub fn can_manage_users(&self) -> bool {
        self.has_role(&[UserRole::Admin])
    }

    pub fn can_approve_permits(&self) -> bool {
        self.has_role(&[UserRole::Admin, UserRole::Supervisor, UserRole::SafetyOfficer])
    }

    pub fn can_manage_incidents(&self) -> bool {
        self.has_role(&[UserRole::Admin, UserRole::Supervisor, UserRole::SafetyOfficer])
    }
}

/// Role check that treats a missing user as having no roles.
pub fn has_role(user: Option<&SessionUser>, roles: &[UserRole]) -> bool {
    user.is_some_and(|user| user.has_role(roles))
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: SessionUser,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// `GET /auth/me` answers either `{ user }` or the user object itself.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MeBody {
    Nested { user: SessionUser },
    Flat(SessionUser),
}

impl MeBody {
    pub(crate) fn into_user(self) -> SessionUser {
        match self {
            Self::Nested { user } | Self::Flat(user) => user,
        }
    }
}

/// Most endpoints wrap their payload as `{ success, data, message }`; some
/// answer with the payload directly.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

/// Accepts ids serialized as strings or integers.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_user_accepts_sparse_payload_and_numeric_id() {
        let user: SessionUser =
            serde_json::from_str(r#"{"id":7,"role":"safety_officer"}"#).expect("user");
        assert_eq!(user.id, "7");
        assert_eq!(user.role, UserRole::SafetyOfficer);
        assert!(user.name.is_empty());
        assert!(user.can_approve_permits());
        assert!(!user.can_manage_users());
    }

    #[test]
    fn unknown_role_is_preserved() {
        let user: SessionUser =
            serde_json::from_str(r#"{"id":"9","role":"contractor"}"#).expect("user");
        assert_eq!(user.role, UserRole::Other("contractor".to_string()));
        assert_eq!(user.role, "contractor");
        let encoded = serde_json::to_value(&user).expect("encode");
        assert_eq!(encoded["role"], "contractor");
    }

    #[test]
    fn role_gating_without_user_denies_everything() {
        assert!(!has_role(None, &[UserRole::Admin, UserRole::Worker]));
    }

    #[test]
    fn envelope_unwraps_data_or_passes_bare_payload() {
        let wrapped: Envelope<TokenPair> = serde_json::from_str(
            r#"{"success":true,"data":{"accessToken":"AT2","refreshToken":"RT2"}}"#,
        )
        .expect("wrapped");
        assert_eq!(wrapped.into_inner().access_token, "AT2");

        let bare: Envelope<TokenPair> =
            serde_json::from_str(r#"{"accessToken":"AT3","refreshToken":"RT3"}"#).expect("bare");
        assert_eq!(bare.into_inner().refresh_token, "RT3");
    }

    #[test]
    fn me_body_accepts_nested_and_flat_users() {
        let nested: Envelope<MeBody> =
            serde_json::from_str(r#"{"data":{"user":{"id":"1","role":"admin"}}}"#).expect("nested");
        assert_eq!(nested.into_inner().into_user().role, UserRole::Admin);

        let flat: Envelope<MeBody> =
            serde_json::from_str(r#"{"id":"2","role":"worker","name":"Sari"}"#).expect("flat");
        assert_eq!(flat.into_inner().into_user().name, "Sari");
    }

    #[test]
    fn login_credentials_debug_hides_password() {
        let credentials = LoginCredentials::new("a@b.com", "secret");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("a@b.com"));
        assert!(!rendered.contains("secret"));
    }
}
