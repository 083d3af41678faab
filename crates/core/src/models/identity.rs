//! Identity and role models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OfficeId, StudentId, UserId};

/// Portal roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    OfficeAdmin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::OfficeAdmin => "office_admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "student" => Some(Role::Student),
            "office_admin" => Some(Role::OfficeAdmin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An authenticated portal user as resolved by the directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub role: Role,
    /// Set for office admins
    pub office_id: Option<OfficeId>,
    /// Set for students
    pub student_id: Option<StudentId>,
    pub display_name: String,
    pub is_online: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn student(id: UserId, student_id: StudentId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Student,
            office_id: None,
            student_id: Some(student_id),
            display_name: display_name.into(),
            is_online: false,
            last_activity: None,
        }
    }

    pub fn office_admin(id: UserId, office_id: OfficeId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::OfficeAdmin,
            office_id: Some(office_id),
            student_id: None,
            display_name: display_name.into(),
            is_online: false,
            last_activity: None,
        }
    }

    pub fn super_admin(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::SuperAdmin,
            office_id: None,
            student_id: None,
            display_name: display_name.into(),
            is_online: false,
            last_activity: None,
        }
    }

    /// Office this identity administers, if it is an office admin
    pub fn administered_office(&self) -> Option<OfficeId> {
        match self.role {
            Role::OfficeAdmin => self.office_id,
            _ => None,
        }
    }

    /// Student record this identity owns, if it is a student
    pub fn owned_student(&self) -> Option<StudentId> {
        match self.role {
            Role::Student => self.student_id,
            _ => None,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip_names() {
        for role in [Role::Student, Role::OfficeAdmin, Role::SuperAdmin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("teacher"), None);
    }

    #[test]
    fn test_affiliation_is_role_scoped() {
        let mut admin = Identity::office_admin(UserId(1), OfficeId(7), "Ana");
        assert_eq!(admin.administered_office(), Some(OfficeId(7)));
        assert_eq!(admin.owned_student(), None);

        // A stray student id on an admin never grants student access
        admin.student_id = Some(StudentId(3));
        assert_eq!(admin.owned_student(), None);
    }
}
