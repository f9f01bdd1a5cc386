use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Identity of the caller as confirmed by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// Body of a token validation response.
#[derive(Debug, Deserialize)]
pub(crate) struct ValidationRepr {
    #[serde(default = "default_valid")]
    valid: bool,
    user: Option<UserRepr>,
}

fn default_valid() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct UserRepr {
    id: Option<serde_json::Value>,
    email: Option<String>,
    #[serde(alias = "username", alias = "displayName")]
    name: Option<String>,
}

impl TryFrom<ValidationRepr> for AuthenticatedUser {
    type Error = AuthError;

    fn try_from(value: ValidationRepr) -> AuthResult<Self> {
        if !value.valid {
            return Err(AuthError::InvalidToken);
        }
        let user = value
            .user
            .ok_or_else(|| AuthError::MalformedIdentityResponse("missing user".into()))?;
        // Some deployments send numeric ids.
        let id = match user.id {
            Some(serde_json::Value::String(id)) if !id.trim().is_empty() => id,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                return Err(AuthError::MalformedIdentityResponse(
                    "missing or empty user id".into(),
                ))
            }
        };
        Ok(AuthenticatedUser {
            id,
            email: user.email,
            display_name: user.name,
        })
    }
}
