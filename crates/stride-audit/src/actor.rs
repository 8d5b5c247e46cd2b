// actor.rs - The acting principal attached to every mutating call.
//
// Identity is resolved by an external authorizer; everything downstream
// receives the resulting Principal explicitly and never looks it up from
// ambient state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of identity is acting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Coach,
    Athlete,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coach => write!(f, "coach"),
            Role::Athlete => write!(f, "athlete"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// An authenticated identity plus its role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn coach(id: impl Into<String>) -> Self {
        Self::new(id, Role::Coach)
    }

    pub fn athlete(id: impl Into<String>) -> Self {
        Self::new(id, Role::Athlete)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_role_and_id() {
        assert_eq!(Principal::coach("c-7").to_string(), "coach:c-7");
        assert_eq!(Principal::admin("ops").to_string(), "admin:ops");
    }

    #[test]
    fn role_serializes_as_snake_case() {
        let json = serde_json::to_string(&Role::Athlete).unwrap();
        assert_eq!(json, "\"athlete\"");
    }
}
