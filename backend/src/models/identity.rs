//! The acting identity and the visibility predicate it implies.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

use crate::models::session::Session;
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSchema, Default)]
/// Roles issued by the authentication provider.
pub enum UserRole {
    /// Student account; sees its own sessions and sessions open to everyone.
    #[default]
    Student,
    /// Administrator; sees and manages every session.
    Admin,
}

impl UserRole {
    /// Returns the canonical snake_case representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Admin => "admin",
        }
    }

    /// Parses a role claim. Unknown roles get the least privilege.
    pub fn from_claim(value: &str) -> Self {
        if value.eq_ignore_ascii_case("admin") {
            UserRole::Admin
        } else {
            UserRole::Student
        }
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(UserRole::from_claim(&s))
    }
}

/// Which sessions an identity is concerned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    All,
    Own,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Identity {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn student(user_id: UserId) -> Self {
        Self::new(user_id, UserRole::Student)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, UserRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn scope(&self) -> AccessScope {
        match self.role {
            UserRole::Admin => AccessScope::All,
            UserRole::Student => AccessScope::Own,
        }
    }

    /// Pure visibility predicate; never touches the backend.
    pub fn can_see(&self, session: &Session) -> bool {
        match self.scope() {
            AccessScope::All => true,
            AccessScope::Own => {
                session.for_all_students
                    || session
                        .student
                        .as_ref()
                        .is_some_and(|student| student.id == self.user_id)
            }
        }
    }
}
