use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ParseEnumError;

/// Account role. Routes and mutations are gated on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Citizen,
    Staff,
    Admin,
}

impl Role {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "citizen" => Ok(Self::Citizen),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            _ => Err(ParseEnumError {
                expected: "role",
                got: s.to_string(),
            }),
        }
    }
}

/// An account as the backend serves it. Email is unique and doubles as the
/// identifier recorded in an issue's upvoters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub is_premium: bool,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        let email = email.into();
        Self {
            id: id.into(),
            name: email.split('@').next().unwrap_or_default().to_string(),
            email,
            photo_url: String::new(),
            role,
            is_blocked: false,
            is_premium: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_reads_photo_url_spelling() {
        let raw = r#"{"_id":"u1","name":"Ana","email":"a@x.com","photoURL":"https://i/a.png","role":"staff","isBlocked":true}"#;
        let user: User = serde_json::from_str(raw).unwrap();
        assert_eq!(user.photo_url, "https://i/a.png");
        assert_eq!(user.role, Role::Staff);
        assert!(user.is_blocked);
        assert!(!user.is_premium);
    }

    #[test]
    fn role_defaults_to_citizen() {
        let user: User = serde_json::from_str(r#"{"_id":"u2","name":"B","email":"b@x.com"}"#).unwrap();
        assert_eq!(user.role, Role::Citizen);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("mayor".parse::<Role>().is_err());
    }
}
