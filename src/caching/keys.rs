//! Cache keys for the cached entity lookups.

use std::fmt;

/// Natural key of a cached entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Teacher(String),
    Student(String),
    TeacherByUserAndOrg { user_id: String, organization_id: String },
    StaffByUserAndOrg { user_id: String, organization_id: String },
    UserByTeacher(String),
    ParentByUser(String),
}

impl CacheKey {
    /// Entity kind, used as key prefix and metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            CacheKey::Teacher(_) => "teacher",
            CacheKey::Student(_) => "student",
            CacheKey::TeacherByUserAndOrg { .. } => "teacher_by_user_org",
            CacheKey::StaffByUserAndOrg { .. } => "staff_by_user_org",
            CacheKey::UserByTeacher(_) => "user_by_teacher",
            CacheKey::ParentByUser(_) => "parent_by_user",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Teacher(id)
            | CacheKey::Student(id)
            | CacheKey::UserByTeacher(id)
            | CacheKey::ParentByUser(id) => write!(f, "{}:{}", self.kind(), id),
            CacheKey::TeacherByUserAndOrg {
                user_id,
                organization_id,
            }
            | CacheKey::StaffByUserAndOrg {
                user_id,
                organization_id,
            } => write!(f, "{}:{}:{}", self.kind(), user_id, organization_id),
        }
    }
}
