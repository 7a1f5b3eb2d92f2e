use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform role; exactly one active role per subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum Role {
    #[default]
    Student = 0,
    Teacher = 1,
    PendingTeacher = 2,
    RejectedTeacher = 3,
    Admin = 4,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Student,
        Role::Teacher,
        Role::PendingTeacher,
        Role::RejectedTeacher,
        Role::Admin,
    ];

    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        use Role::*;
        match self {
            Student => "student",
            Teacher => "teacher",
            PendingTeacher => "pending_teacher",
            RejectedTeacher => "rejected_teacher",
            Admin => "admin",
        }
    }

    #[inline]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn from_id(id: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.id() == id)
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.code() == code)
    }

    /// Initial roles a subject may be provisioned with
    #[inline]
    pub const fn is_initial(&self) -> bool {
        matches!(self, Role::Student | Role::PendingTeacher)
    }

    /// Whether an administrative or review action may move a subject from `self` to `next`
    ///
    /// Review outcomes (teacher / rejected) only apply to pending applications;
    /// nothing moves back into review except a new application.
    pub const fn can_transition_to(&self, next: Role) -> bool {
        use Role::*;
        match (*self, next) {
            (Admin, Admin) => false,
            (_, Admin) | (Admin, _) => true,
            (Student, PendingTeacher) | (Student, Teacher) => true,
            (PendingTeacher, Teacher) | (PendingTeacher, RejectedTeacher) => true,
            (PendingTeacher, Student) => true,
            (RejectedTeacher, PendingTeacher) | (RejectedTeacher, Student) => true,
            (Teacher, Student) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_id_and_code_roundtrip() {
        for role in Role::ALL {
            assert_eq!(Role::from_id(role.id()), Some(role));
            assert_eq!(Role::from_code(role.code()), Some(role));
        }
        assert_eq!(Role::from_id(42), None);
        assert_eq!(Role::from_code("superuser"), None);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::PendingTeacher.to_string(), "pending_teacher");
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_review_outcomes_only_from_pending() {
        assert!(Role::PendingTeacher.can_transition_to(Role::Teacher));
        assert!(Role::PendingTeacher.can_transition_to(Role::RejectedTeacher));
        assert!(!Role::Student.can_transition_to(Role::RejectedTeacher));
        assert!(!Role::Teacher.can_transition_to(Role::PendingTeacher));
        assert!(!Role::Teacher.can_transition_to(Role::RejectedTeacher));
    }

    #[test]
    fn test_no_self_transition() {
        for role in Role::ALL {
            assert!(!role.can_transition_to(role));
        }
    }

    #[test]
    fn test_admin_promotion_and_demotion() {
        assert!(Role::Student.can_transition_to(Role::Admin));
        assert!(Role::Admin.can_transition_to(Role::Teacher));
    }

    #[test]
    fn test_initial_roles() {
        assert!(Role::Student.is_initial());
        assert!(Role::PendingTeacher.is_initial());
        assert!(!Role::Teacher.is_initial());
        assert!(!Role::Admin.is_initial());
    }
}
