//! Payloads exchanged with the main service.
//!
//! Response types tolerate missing fields so a partially populated cache entry still decodes;
//! whether it is usable is decided by [`CacheValidity`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::caching::CacheValidity;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Avatar {
    pub image_id: u64,
    pub image_key: String,
    pub image_url: String,
    pub index: i32,
    pub is_main: bool,
}

/// The authenticated caller, as known to the main service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub avatar: Avatar,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeacherResponse {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub avatar: Avatar,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffResponse {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub avatar: Avatar,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentResponse {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub avatar: Avatar,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentResponse {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub name: String,
    pub avatar: Avatar,
}

/// One component of a department menu
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
    pub value: String,
    pub order: i32,
    pub is_show: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepartmentMenu {
    pub components: Vec<MenuResponse>,
}

/// Component to create or update; `id == None` creates a new one
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuComponentRequest {
    pub id: Option<Uuid>,
    pub section_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub key: String,
    pub value: String,
    pub order: i32,
    pub is_show: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDepartmentMenuRequest {
    pub department_id: String,
    pub delete_component_ids: Vec<String>,
    pub components: Vec<MenuComponentRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDepartmentMenuOrganizationRequest {
    pub department_id: String,
    pub organization_id: String,
    pub delete_component_ids: Vec<String>,
    pub components: Vec<MenuComponentRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImageUrlRequest<'a> {
    pub key: &'a str,
    pub mode: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AvatarUrlRequest<'a> {
    pub owner_id: &'a str,
    pub owner_role: &'a str,
}

impl CacheValidity for TeacherResponse {
    fn is_usable(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

impl CacheValidity for StaffResponse {
    fn is_usable(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

impl CacheValidity for StudentResponse {
    fn is_usable(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

impl CacheValidity for ParentResponse {
    fn is_usable(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

// Users cached by teacher may legitimately have no display name yet
impl CacheValidity for CurrentUser {
    fn is_usable(&self) -> bool {
        !self.id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_menu_type_field_name() {
        let menu: MenuResponse = serde_json::from_value(json!({
            "id": "m1", "name": "Home", "type": "link", "key": "home", "value": "/", "order": 1, "is_show": true
        }))
        .unwrap();
        assert_eq!(menu.kind, "link");

        let encoded = serde_json::to_value(&menu).unwrap();
        assert_eq!(encoded["type"], "link");
    }

    #[test]
    fn test_new_component_serializes_null_id() {
        let component = MenuComponentRequest {
            name: "Home".into(),
            ..Default::default()
        };
        let encoded = serde_json::to_value(&component).unwrap();
        assert!(encoded["id"].is_null());
    }

    #[test]
    fn test_validity_rules() {
        let teacher = TeacherResponse { id: "T1".into(), ..Default::default() };
        assert!(!teacher.is_usable());

        let user = CurrentUser { id: "U1".into(), ..Default::default() };
        assert!(user.is_usable());
        assert!(!CurrentUser::default().is_usable());
    }
}
