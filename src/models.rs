//! Wire models shared by the auth gateway and the request pipeline.
//!
//! The API speaks camelCase JSON; every struct here carries the matching
//! serde rename so callers never see wire naming.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The signed-in user as the API reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

impl UserIdentity {
    /// Check whether the user carries a specific role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles
            .as_ref()
            .map(|roles| roles.iter().any(|r| r == role))
            .unwrap_or(false)
    }
}

/// Success body of login, signup and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// The new access token.
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user: UserIdentity,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub token_type: String,
}

/// Request body for `/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember_me: Option<bool>,
}

/// Request body for `/auth/signup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub accept_terms: bool,
}

/// Request body for `/auth/refresh-token` and `/auth/validate-token`;
/// both endpoints take the token as payload, never as a header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

/// Success body of `/auth/validate-token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub user: UserIdentity,
}

/// The stored credential pair. Owned by the credential store; everyone
/// else works on clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Build the credential pair out of an auth endpoint's success body.
    pub fn from_response(response: &AuthResponse) -> Self {
        Self {
            access_token: response.token.clone(),
            refresh_token: response.refresh_token.clone(),
            expires_at: Some(Utc::now() + Duration::seconds(response.expires_in)),
        }
    }

    /// Check if the access token is past its known expiry. Unknown expiry
    /// is treated as still valid.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| exp <= Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_user() -> UserIdentity {
        UserIdentity {
            id: 7,
            email: "amina@example.com".to_string(),
            first_name: "Amina".to_string(),
            last_name: "Diallo".to_string(),
            profile_picture: None,
            roles: Some(vec!["user".to_string()]),
        }
    }

    #[test]
    fn auth_response_uses_camel_case() {
        let body = json!({
            "token": "abc",
            "refreshToken": "def",
            "user": {
                "id": 7,
                "email": "amina@example.com",
                "firstName": "Amina",
                "lastName": "Diallo",
                "roles": ["user"]
            },
            "expiresIn": 3600,
            "tokenType": "Bearer"
        });

        let parsed: AuthResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.refresh_token.as_deref(), Some("def"));
        assert_eq!(parsed.user, sample_user());

        let out = serde_json::to_value(&parsed).unwrap();
        assert!(out.get("refreshToken").is_some());
        assert!(out["user"].get("firstName").is_some());
    }

    #[test]
    fn credentials_from_response_computes_expiry() {
        let response = AuthResponse {
            token: "abc".to_string(),
            refresh_token: Some("def".to_string()),
            user: sample_user(),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        };

        let credentials = Credentials::from_response(&response);
        assert_eq!(credentials.access_token, "abc");
        assert!(!credentials.is_expired());

        let expired = Credentials {
            access_token: "abc".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() - Duration::seconds(5)),
        };
        assert!(expired.is_expired());
    }

    #[test]
    fn role_lookup() {
        let user = sample_user();
        assert!(user.has_role("user"));
        assert!(!user.has_role("admin"));
    }
}
