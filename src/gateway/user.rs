//! # User Gateway
//!
//! Lookups of users, teachers, staff, students and parents on the main service.
//!
//! Six lookups consult the entity cache first: student, teacher, teacher by user and
//! organization, staff by user and organization, user by teacher, parent by user. The cache
//! is checked before the bearer token, so a usable cached entry is served even without one.
//! `get_current_user` and `get_children_by_parent_id` always go to the network, like the
//! remaining uncached lookups.

use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;

use super::client::GatewayClient;
use super::dto::{CurrentUser, ParentResponse, StaffResponse, StudentResponse, TeacherResponse};
use super::{fetch_enveloped, fetch_enveloped_list};
use crate::caching::{read_through, CacheKey, EntityCache};
use crate::core::error::GatewayResult;
use crate::core::types::RequestContext;

#[async_trait]
pub trait UserGateway: Send + Sync {
    /// The user owning the request's bearer token
    async fn get_current_user(&self, ctx: &RequestContext) -> GatewayResult<CurrentUser>;

    async fn get_user_info(&self, ctx: &RequestContext, user_id: &str) -> GatewayResult<CurrentUser>;

    async fn get_teachers_by_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> GatewayResult<Vec<TeacherResponse>>;

    async fn get_staffs_by_user(&self, ctx: &RequestContext, user_id: &str) -> GatewayResult<Vec<StaffResponse>>;

    async fn get_teacher_info(&self, ctx: &RequestContext, teacher_id: &str) -> GatewayResult<TeacherResponse>;

    async fn get_staff_info(&self, ctx: &RequestContext, staff_id: &str) -> GatewayResult<StaffResponse>;

    async fn get_student_info(&self, ctx: &RequestContext, student_id: &str) -> GatewayResult<StudentResponse>;

    async fn get_teacher_by_user_and_organization(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        organization_id: &str,
    ) -> GatewayResult<TeacherResponse>;

    async fn get_staff_by_user_and_organization(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        organization_id: &str,
    ) -> GatewayResult<StaffResponse>;

    async fn get_user_by_teacher(&self, ctx: &RequestContext, teacher_id: &str) -> GatewayResult<CurrentUser>;

    async fn get_parent_by_user(&self, ctx: &RequestContext, user_id: &str) -> GatewayResult<ParentResponse>;

    async fn get_children_by_parent_id(
        &self,
        ctx: &RequestContext,
        parent_id: &str,
    ) -> GatewayResult<Vec<StudentResponse>>;
}

pub struct UserGatewayImpl {
    client: Arc<GatewayClient>,
    cache: Arc<dyn EntityCache>,
}

impl UserGatewayImpl {
    pub fn new(client: Arc<GatewayClient>, cache: Arc<dyn EntityCache>) -> Self {
        Self { client, cache }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        path: &str,
    ) -> GatewayResult<T> {
        fetch_enveloped(&self.client, ctx, operation, Method::GET, path, None::<&()>).await
    }

    async fn get_list<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        path: &str,
    ) -> GatewayResult<Vec<T>> {
        fetch_enveloped_list(&self.client, ctx, operation, Method::GET, path, None::<&()>).await
    }
}

#[async_trait]
impl UserGateway for UserGatewayImpl {
    async fn get_current_user(&self, ctx: &RequestContext) -> GatewayResult<CurrentUser> {
        self.get(ctx, "get current user", "/v1/user/current-user").await
    }

    async fn get_user_info(&self, ctx: &RequestContext, user_id: &str) -> GatewayResult<CurrentUser> {
        self.get(ctx, "get user info", &format!("/v1/gateway/users/{}", user_id))
            .await
    }

    async fn get_teachers_by_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
    ) -> GatewayResult<Vec<TeacherResponse>> {
        self.get_list(
            ctx,
            "get teachers by user",
            &format!("/v1/gateway/teachers/get-by-user/{}", user_id),
        )
        .await
    }

    async fn get_staffs_by_user(&self, ctx: &RequestContext, user_id: &str) -> GatewayResult<Vec<StaffResponse>> {
        self.get_list(
            ctx,
            "get staffs by user",
            &format!("/v1/gateway/staffs/get-by-user/{}", user_id),
        )
        .await
    }

    async fn get_teacher_info(&self, ctx: &RequestContext, teacher_id: &str) -> GatewayResult<TeacherResponse> {
        let key = CacheKey::Teacher(teacher_id.to_string());
        if let Some(teacher) = read_through(self.cache.as_ref(), ctx, key).await {
            return Ok(teacher);
        }
        self.get(ctx, "get teacher info", &format!("/v1/gateway/teachers/{}", teacher_id))
            .await
    }

    async fn get_staff_info(&self, ctx: &RequestContext, staff_id: &str) -> GatewayResult<StaffResponse> {
        self.get(ctx, "get staff info", &format!("/v1/gateway/staffs/{}", staff_id))
            .await
    }

    async fn get_student_info(&self, ctx: &RequestContext, student_id: &str) -> GatewayResult<StudentResponse> {
        let key = CacheKey::Student(student_id.to_string());
        if let Some(student) = read_through(self.cache.as_ref(), ctx, key).await {
            return Ok(student);
        }
        self.get(ctx, "get student info", &format!("/v1/gateway/students/{}", student_id))
            .await
    }

    async fn get_teacher_by_user_and_organization(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        organization_id: &str,
    ) -> GatewayResult<TeacherResponse> {
        let key = CacheKey::TeacherByUserAndOrg {
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
        };
        if let Some(teacher) = read_through(self.cache.as_ref(), ctx, key).await {
            return Ok(teacher);
        }
        self.get(
            ctx,
            "get teacher by user and organization",
            &format!(
                "/v1/gateway/teachers/organization/{}/user/{}",
                organization_id, user_id
            ),
        )
        .await
    }

    async fn get_staff_by_user_and_organization(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        organization_id: &str,
    ) -> GatewayResult<StaffResponse> {
        let key = CacheKey::StaffByUserAndOrg {
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
        };
        if let Some(staff) = read_through(self.cache.as_ref(), ctx, key).await {
            return Ok(staff);
        }
        self.get(
            ctx,
            "get staff by user and organization",
            &format!(
                "/v1/gateway/staffs/organization/{}/user/{}",
                organization_id, user_id
            ),
        )
        .await
    }

    async fn get_user_by_teacher(&self, ctx: &RequestContext, teacher_id: &str) -> GatewayResult<CurrentUser> {
        let key = CacheKey::UserByTeacher(teacher_id.to_string());
        if let Some(user) = read_through(self.cache.as_ref(), ctx, key).await {
            return Ok(user);
        }
        self.get(
            ctx,
            "get user by teacher",
            &format!("/v1/gateway/users/teacher/{}", teacher_id),
        )
        .await
    }

    async fn get_parent_by_user(&self, ctx: &RequestContext, user_id: &str) -> GatewayResult<ParentResponse> {
        let key = CacheKey::ParentByUser(user_id.to_string());
        if let Some(parent) = read_through(self.cache.as_ref(), ctx, key).await {
            return Ok(parent);
        }
        self.get(
            ctx,
            "get parent by user",
            &format!("/v1/gateway/parents/get-by-user/{}", user_id),
        )
        .await
    }

    async fn get_children_by_parent_id(
        &self,
        ctx: &RequestContext,
        parent_id: &str,
    ) -> GatewayResult<Vec<StudentResponse>> {
        self.get_list(
            ctx,
            "get children by parent",
            &format!("/v1/gateway/students/parent/{}", parent_id),
        )
        .await
    }
}
