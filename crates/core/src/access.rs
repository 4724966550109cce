use crate::error::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried by an authenticated actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Administrator,
    User,
    Commenter,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::User => "user",
            Self::Commenter => "commenter",
        }
    }

    /// Check whether this role may perform an action
    pub fn permits(&self, action: Action) -> bool {
        match (self, action) {
            (Self::Administrator, _) => true,
            (Self::User, Action::Administer) => false,
            (Self::User, _) => true,
            (Self::Commenter, Action::Read) => true,
            (Self::Commenter, _) => false,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "administrator" | "admin" => Ok(Self::Administrator),
            "user" => Ok(Self::User),
            "commenter" => Ok(Self::Commenter),
            other => Err(DomainError::InvalidArguments(format!("unknown role '{}'", other))),
        }
    }
}

/// Permission action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    /// Status models, requirement and relationship types
    Administer,
}

/// Authenticated principal attached to a request scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: Uuid, username: impl Into<String>, role: UserRole) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }

    /// Fail with Forbidden unless the actor's role permits the action
    pub fn authorize(&self, action: Action, operation: &str) -> DomainResult<()> {
        if self.role.permits(action) {
            Ok(())
        } else {
            Err(DomainError::Forbidden(format!(
                "role '{}' may not perform {}",
                self.role, operation
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(UserRole::Administrator.permits(Action::Administer));
        assert!(UserRole::User.permits(Action::Delete));
        assert!(!UserRole::User.permits(Action::Administer));
        assert!(UserRole::Commenter.permits(Action::Read));
        assert!(!UserRole::Commenter.permits(Action::Create));
    }

    #[test]
    fn test_authorize() {
        let actor = Actor::new(Uuid::new_v4(), "viewer", UserRole::Commenter);
        assert!(actor.authorize(Action::Read, "resources/read").is_ok());
        assert!(matches!(
            actor.authorize(Action::Create, "create_epic"),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Administrator);
        assert!("root".parse::<UserRole>().is_err());
    }
}
