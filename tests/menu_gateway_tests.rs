//! # Menu Gateway Integration Tests
//!
//! Department menu and image URL operations against a mock main service.

mod common;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::{envelope, failed_envelope, gateway_fixture, received_count};
use services_gateway::gateway::dto::{
    MenuComponentRequest, UploadDepartmentMenuOrganizationRequest, UploadDepartmentMenuRequest,
};
use services_gateway::gateway::MenuGatewayImpl;
use services_gateway::{GatewayError, MenuGateway, RequestContext};

fn component(id: Option<Uuid>, name: &str) -> MenuComponentRequest {
    MenuComponentRequest {
        id,
        section_id: "sec-1".to_string(),
        name: name.to_string(),
        kind: "link".to_string(),
        key: "url".to_string(),
        value: "https://example.com".to_string(),
        order: 1,
        is_show: true,
    }
}

/// Uploading posts the request as JSON and ignores the returned payload
#[tokio::test]
async fn test_upload_department_menu() {
    let fixture = gateway_fixture().await;
    let request = UploadDepartmentMenuRequest {
        department_id: "D1".to_string(),
        delete_component_ids: vec!["old-1".to_string()],
        components: vec![component(None, "Home"), component(Some(Uuid::new_v4()), "About")],
    };

    Mock::given(method("POST"))
        .and(path("/v1/gateway/menus/department"))
        .and(body_json(serde_json::to_value(&request).unwrap()))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({"updated": 2}))))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let menus = MenuGatewayImpl::new(fixture.client.clone());
    let ctx = RequestContext::new().with_token("tok");
    menus.upload_department_menu(&ctx, &request).await.unwrap();
}

/// Components serialize their kind under `type` and new ones carry a null id
#[tokio::test]
async fn test_component_wire_format() {
    let value = serde_json::to_value(component(None, "Home")).unwrap();
    assert_eq!(value["type"], "link");
    assert!(value["id"].is_null());
    assert!(value.get("kind").is_none());
}

/// The department menu is unwrapped to its components
#[tokio::test]
async fn test_get_department_menu() {
    let fixture = gateway_fixture().await;
    Mock::given(method("GET"))
        .and(path("/v1/gateway/menus/department/D1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({
            "components": [
                {"id": "c1", "name": "Home", "type": "link", "key": "url", "value": "/", "order": 1, "is_show": true},
                {"id": "c2", "name": "Hidden", "type": "text", "key": "t", "value": "x", "order": 2, "is_show": false}
            ]
        }))))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let menus = MenuGatewayImpl::new(fixture.client.clone());
    let ctx = RequestContext::new().with_token("tok");

    let components = menus.get_department_menu(&ctx, "D1").await.unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0].kind, "link");
    assert!(!components[1].is_show);
}

/// A department without a menu yields no components
#[tokio::test]
async fn test_get_department_menu_null_payload() {
    let fixture = gateway_fixture().await;
    Mock::given(method("GET"))
        .and(path("/v1/gateway/menus/department/D2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(null))))
        .mount(&fixture.server)
        .await;

    let menus = MenuGatewayImpl::new(fixture.client.clone());
    let ctx = RequestContext::new().with_token("tok");

    assert!(menus.get_department_menu(&ctx, "D2").await.unwrap().is_empty());
}

/// Image keys resolve to URLs
#[tokio::test]
async fn test_get_image_url() {
    let fixture = gateway_fixture().await;
    Mock::given(method("POST"))
        .and(path("/v1/gateway/images/get-url"))
        .and(body_json(json!({"key": "img/1.png", "mode": "thumbnail"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!("https://cdn/img/1.png"))))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let menus = MenuGatewayImpl::new(fixture.client.clone());
    let ctx = RequestContext::new().with_token("tok");

    let url = menus.get_image_url(&ctx, "img/1.png", "thumbnail").await.unwrap();
    assert_eq!(url, "https://cdn/img/1.png");
}

#[tokio::test]
async fn test_get_avatar_url() {
    let fixture = gateway_fixture().await;
    Mock::given(method("POST"))
        .and(path("/v1/gateway/images/avatar/get-url"))
        .and(body_json(json!({"owner_id": "U1", "owner_role": "teacher"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!("https://cdn/avatar/U1"))))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let menus = MenuGatewayImpl::new(fixture.client.clone());
    let ctx = RequestContext::new().with_token("tok");

    let url = menus.get_avatar_url(&ctx, "U1", "teacher").await.unwrap();
    assert_eq!(url, "https://cdn/avatar/U1");
}

/// Organization scoped menus upload and list
#[tokio::test]
async fn test_department_menu_organization_round_trip() {
    let fixture = gateway_fixture().await;
    let request = UploadDepartmentMenuOrganizationRequest {
        department_id: "D1".to_string(),
        organization_id: "O1".to_string(),
        delete_component_ids: Vec::new(),
        components: vec![component(None, "Home")],
    };

    Mock::given(method("POST"))
        .and(path("/v1/gateway/menus/department/organization"))
        .and(body_json(serde_json::to_value(&request).unwrap()))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(null))))
        .expect(1)
        .mount(&fixture.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/gateway/menus/department/D1/organization/O1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            {"id": "c1", "name": "Home", "type": "link", "key": "url", "value": "/", "order": 1, "is_show": true}
        ]))))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let menus = MenuGatewayImpl::new(fixture.client.clone());
    let ctx = RequestContext::new().with_token("tok");

    menus.upload_department_menu_organization(&ctx, &request).await.unwrap();
    let components = menus
        .get_department_menu_organization(&ctx, "D1", "O1")
        .await
        .unwrap();
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].name, "Home");
}

/// Envelope failures carry the operation name
#[tokio::test]
async fn test_menu_envelope_failure() {
    let fixture = gateway_fixture().await;
    Mock::given(method("POST"))
        .and(path("/v1/gateway/images/get-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(failed_envelope(404, "image not found")))
        .mount(&fixture.server)
        .await;

    let menus = MenuGatewayImpl::new(fixture.client.clone());
    let ctx = RequestContext::new().with_token("tok");

    let err = menus.get_image_url(&ctx, "missing", "full").await.unwrap_err();
    assert_eq!(err.to_string(), "get image url failed: gateway error: image not found");
}

/// Menu operations never run without a token
#[tokio::test]
async fn test_menu_requires_token() {
    let fixture = gateway_fixture().await;
    let menus = MenuGatewayImpl::new(fixture.client.clone());

    let err = menus
        .get_department_menu(&RequestContext::new(), "D1")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::MissingToken));
    assert_eq!(received_count(&fixture.server).await, 0);
}
