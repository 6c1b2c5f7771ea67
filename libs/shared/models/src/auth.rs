use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Clinic staff roles. The identity service issues the role as a bare string
/// claim; anything unrecognised is treated as no role at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Veterinarian,
    Receptionist,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "veterinarian" => Some(Role::Veterinarian),
            "receptionist" => Some(Role::Receptionist),
            _ => None,
        }
    }

    /// Schedule and block mutations are restricted to clinical management.
    pub fn can_manage_schedules(&self) -> bool {
        matches!(self, Role::Admin | Role::Veterinarian)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Veterinarian => write!(f, "veterinarian"),
            Role::Receptionist => write!(f, "receptionist"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn require_role(&self) -> Result<Role, crate::error::AppError> {
        self.role.ok_or_else(|| {
            crate::error::AppError::Auth("No clinic role assigned to this user".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("veterinarian"), Some(Role::Veterinarian));
        assert_eq!(Role::parse("receptionist"), Some(Role::Receptionist));
        assert_eq!(Role::parse("groomer"), None);
    }

    #[test]
    fn schedule_management_is_restricted() {
        assert!(Role::Admin.can_manage_schedules());
        assert!(Role::Veterinarian.can_manage_schedules());
        assert!(!Role::Receptionist.can_manage_schedules());
    }
}
