//! Department menus and image URLs on the main service. Never cached.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::IgnoredAny;
use std::sync::Arc;

use super::client::GatewayClient;
use super::dto::{
    AvatarUrlRequest, DepartmentMenu, ImageUrlRequest, MenuResponse, UploadDepartmentMenuOrganizationRequest,
    UploadDepartmentMenuRequest,
};
use super::{fetch_enveloped, fetch_enveloped_list};
use crate::core::error::GatewayResult;
use crate::core::types::RequestContext;

#[async_trait]
pub trait MenuGateway: Send + Sync {
    async fn upload_department_menu(
        &self,
        ctx: &RequestContext,
        request: &UploadDepartmentMenuRequest,
    ) -> GatewayResult<()>;

    async fn get_department_menu(&self, ctx: &RequestContext, department_id: &str) -> GatewayResult<Vec<MenuResponse>>;

    /// Resolve a stored image key into a URL; `mode` selects the variant (e.g. thumbnail)
    async fn get_image_url(&self, ctx: &RequestContext, image_key: &str, mode: &str) -> GatewayResult<String>;

    async fn get_avatar_url(&self, ctx: &RequestContext, owner_id: &str, owner_role: &str) -> GatewayResult<String>;

    async fn upload_department_menu_organization(
        &self,
        ctx: &RequestContext,
        request: &UploadDepartmentMenuOrganizationRequest,
    ) -> GatewayResult<()>;

    async fn get_department_menu_organization(
        &self,
        ctx: &RequestContext,
        department_id: &str,
        organization_id: &str,
    ) -> GatewayResult<Vec<MenuResponse>>;
}

pub struct MenuGatewayImpl {
    client: Arc<GatewayClient>,
}

impl MenuGatewayImpl {
    pub fn new(client: Arc<GatewayClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MenuGateway for MenuGatewayImpl {
    async fn upload_department_menu(
        &self,
        ctx: &RequestContext,
        request: &UploadDepartmentMenuRequest,
    ) -> GatewayResult<()> {
        let _: IgnoredAny = fetch_enveloped(
            &self.client,
            ctx,
            "upload department menu",
            Method::POST,
            "/v1/gateway/menus/department",
            Some(request),
        )
        .await?;
        Ok(())
    }

    async fn get_department_menu(&self, ctx: &RequestContext, department_id: &str) -> GatewayResult<Vec<MenuResponse>> {
        let menu: Option<DepartmentMenu> = fetch_enveloped(
            &self.client,
            ctx,
            "get department menu",
            Method::GET,
            &format!("/v1/gateway/menus/department/{}", department_id),
            None::<&()>,
        )
        .await?;
        Ok(menu.map(|menu| menu.components).unwrap_or_default())
    }

    async fn get_image_url(&self, ctx: &RequestContext, image_key: &str, mode: &str) -> GatewayResult<String> {
        fetch_enveloped(
            &self.client,
            ctx,
            "get image url",
            Method::POST,
            "/v1/gateway/images/get-url",
            Some(&ImageUrlRequest { key: image_key, mode }),
        )
        .await
    }

    async fn get_avatar_url(&self, ctx: &RequestContext, owner_id: &str, owner_role: &str) -> GatewayResult<String> {
        fetch_enveloped(
            &self.client,
            ctx,
            "get avatar url",
            Method::POST,
            "/v1/gateway/images/avatar/get-url",
            Some(&AvatarUrlRequest { owner_id, owner_role }),
        )
        .await
    }

    async fn upload_department_menu_organization(
        &self,
        ctx: &RequestContext,
        request: &UploadDepartmentMenuOrganizationRequest,
    ) -> GatewayResult<()> {
        let _: IgnoredAny = fetch_enveloped(
            &self.client,
            ctx,
            "upload department menu organization",
            Method::POST,
            "/v1/gateway/menus/department/organization",
            Some(request),
        )
        .await?;
        Ok(())
    }

    async fn get_department_menu_organization(
        &self,
        ctx: &RequestContext,
        department_id: &str,
        organization_id: &str,
    ) -> GatewayResult<Vec<MenuResponse>> {
        fetch_enveloped_list(
            &self.client,
            ctx,
            "get department menu organization",
            Method::GET,
            &format!(
                "/v1/gateway/menus/department/{}/organization/{}",
                department_id, organization_id
            ),
            None::<&()>,
        )
        .await
    }
}
