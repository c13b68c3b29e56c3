//! Records shared by the auth handler, the signup hooks and the Postgres store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Owner,
    Admin,
    Member,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A persisted user. The email doubles as the login username.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub salt: String,
    pub name: Option<String>,
    pub account_id: Uuid,
    pub role: Role,
    /// SHA-256 of the outstanding reset token, never the token itself.
    pub reset_token: Option<Vec<u8>>,
    /// Unix seconds.
    pub reset_token_expires_at: Option<i64>,
}

impl User {
    /// The user without credential material, safe to send to clients.
    #[must_use]
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            account_id: self.account_id,
            role: self.role,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub account_id: Uuid,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub api_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: String,
    pub salt: String,
    pub name: Option<String>,
    pub account_id: Uuid,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Owner".parse::<Role>(), Ok(Role::Owner));
        assert_eq!(" member ".parse::<Role>(), Ok(Role::Member));
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::Owner);
    }

    #[test]
    fn public_user_drops_credentials() -> anyhow::Result<()> {
        let user = User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            hashed_password: "hash".to_string(),
            salt: "salt".to_string(),
            name: Some("Ada".to_string()),
            account_id: Uuid::new_v4(),
            role: Role::Owner,
            reset_token: Some(vec![1, 2, 3]),
            reset_token_expires_at: Some(1),
        };
        let value = serde_json::to_value(user.public())?;
        assert_eq!(value["email"], "ada@example.com");
        assert_eq!(value["role"], "owner");
        assert_eq!(value["accountId"], user.account_id.to_string());
        assert!(value.get("hashedPassword").is_none());
        assert!(value.get("salt").is_none());
        assert!(value.get("resetToken").is_none());
        Ok(())
    }
}
