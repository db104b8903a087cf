use serde_json::json;
use shopdesk::{
    ApiError, ChargeStep, ConversationStore, CredentialStore, DashboardRange, Identity, LoginStep,
    SessionClient, TokenPair,
};
use std::str::FromStr;
use std::time::Duration;
use time::macros::date;
use wiremock::matchers::{any, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ID: Identity = Identity(42);

async fn client_for(server: &MockServer) -> SessionClient {
    let store = CredentialStore::open_ephemeral().unwrap();
    SessionClient::new(&server.uri(), store).unwrap()
}

async fn logged_in_client(server: &MockServer) -> SessionClient {
    let client = client_for(server).await;
    client
        .store()
        .upsert(ID, &TokenPair::new("A1", "R1"))
        .await
        .unwrap();
    client
}

fn cookie_pair(access: &str, refresh: &str) -> String {
    format!("access_token={}; refresh_token={}", access, refresh)
}

fn login_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .append_header("set-cookie", "access_token=A1; Path=/; HttpOnly")
        .append_header("set-cookie", "refresh_token=R1; Path=/; HttpOnly")
        .set_body_json(json!({}))
}

#[tokio::test]
async fn test_login_stores_cookie_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/"))
        .and(body_json(json!({"email": "staff@example.com", "password": "hunter2"})))
        .respond_with(login_ok())
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(client.login(ID, "staff@example.com", "hunter2").await.unwrap());
    assert_eq!(
        client.store().get(ID).await.unwrap(),
        Some(TokenPair::new("A1", "R1"))
    );
    assert!(client.store().is_authorized(ID).await.unwrap());
}

#[tokio::test]
async fn test_login_refused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "nope"})))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(!client.login(ID, "staff@example.com", "wrong").await.unwrap());
    assert_eq!(client.store().get(ID).await.unwrap(), None);
}

#[tokio::test]
async fn test_login_missing_refresh_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/"))
        .respond_with(
            ResponseTemplate::new(200).append_header("set-cookie", "access_token=A1; Path=/"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .login(ID, "staff@example.com", "hunter2")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::MissingCredentials("refresh_token")));
    assert_eq!(client.store().get(ID).await.unwrap(), None);
}

#[tokio::test]
async fn test_unauthorized_identity_never_hits_network() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.list_orders(ID, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthorized(Identity(42))));
    assert!(err.requires_login());
    assert!(matches!(
        client.order_detail(ID, 7).await,
        Err(ApiError::NotAuthorized(_))
    ));
}

#[tokio::test]
async fn test_refresh_and_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/list/1/"))
        .and(header("cookie", cookie_pair("A1", "R1").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .and(body_json(json!({"refresh": "R1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/order/list/1/"))
        .and(header("cookie", cookie_pair("A2", "R1").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}],
            "current_page": 1,
            "total_pages": 1,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let page = client.list_orders(ID, 1).await.unwrap();
    assert_eq!(page.data, vec![json!({"id": 1})]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(
        client.store().get(ID).await.unwrap(),
        Some(TokenPair::new("A2", "R1"))
    );
}

#[tokio::test]
async fn test_refresh_rotates_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/detail/5/"))
        .and(header("cookie", cookie_pair("A1", "R1").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "A2", "refresh": "R2"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/order/detail/5/"))
        .and(header("cookie", cookie_pair("A2", "R2").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": {"id": 5}})))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let order = client.order_detail(ID, 5).await.unwrap();
    assert_eq!(order["detail"]["id"], 5);
    assert_eq!(
        client.store().get(ID).await.unwrap(),
        Some(TokenPair::new("A2", "R2"))
    );
}

#[tokio::test]
async fn test_refresh_failure_is_auth_expired() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feedback/list/1/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let err = client.list_applications(ID, 1).await.unwrap_err();
    assert!(matches!(err, ApiError::AuthExpired(Identity(42))));
    assert!(err.requires_login());
    assert_eq!(client.pending_refreshes(), 0);
}

#[tokio::test]
async fn test_refresh_without_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feedback/request/3/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    assert!(matches!(
        client.application_detail(ID, 3).await,
        Err(ApiError::MissingCredentials("access"))
    ));
    assert_eq!(
        client.store().get(ID).await.unwrap(),
        Some(TokenPair::new("A1", "R1"))
    );
}

#[tokio::test]
async fn test_second_unauthorized_is_final() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/list/1/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    assert!(matches!(
        client.list_orders(ID, 1).await,
        Err(ApiError::AuthExpired(_))
    ));
}

#[tokio::test]
async fn test_concurrent_calls_refresh_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("cookie", cookie_pair("A1", "R1").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1..=2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access": "A2"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header("cookie", cookie_pair("A2", "R1").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let (a, b) = tokio::join!(client.order_detail(ID, 1), client.order_detail(ID, 2));
    assert_eq!(a.unwrap(), json!({"ok": true}));
    assert_eq!(b.unwrap(), json!({"ok": true}));
    assert_eq!(
        client.store().get(ID).await.unwrap(),
        Some(TokenPair::new("A2", "R1"))
    );
    assert_eq!(client.pending_refreshes(), 0);
}

#[tokio::test]
async fn test_backend_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/detail/9/"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    match client.order_detail(ID, 9).await {
        Err(ApiError::Backend { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_pagination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/order/list/2/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 11}, {"id": 12}],
            "current_page": 2,
            "total_pages": 3,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feedback/list/1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [],
            "current_page": 1,
            "total_pages": 0,
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let page = client.list_orders(ID, 2).await.unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.previous(), Some(1));
    assert_eq!(page.next(), Some(3));

    let empty = client.list_applications(ID, 1).await.unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.next(), None);
    // page 0 is requested as page 1
    client.list_applications(ID, 0).await.unwrap();
}

#[tokio::test]
async fn test_dashboard_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/settings_site/dashboard/"))
        .and(header("cookie", cookie_pair("A1", "R1").as_str()))
        .and(body_json(json!({"date_in": "2026-10-01", "date_out": "2026-10-18"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "indicators": [{"name": "Orders", "value": 4}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let span = DashboardRange::CurrentMonth
        .span_ending(date!(2026 - 10 - 18))
        .unwrap();
    let dash = client.dashboard(ID, &span).await.unwrap();
    assert_eq!(dash["indicators"][0]["value"], 4);
}

#[tokio::test]
async fn test_supplier_import_and_charge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/product_import_manager/supplier_import/"))
        .and(body_json(json!({"slug": "medved"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "supplier_data": {"name": "Medved", "extra_charge": 1.1},
            "task_results": {"tire": {"last_status": "SUCCESS"}},
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/product_import_manager/supplier_import/"))
        .and(body_json(json!({"slug": "medved", "extra_charge": 1.15})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/product_import_manager/supplier_import/"))
        .and(body_json(json!({"slug": "nobody", "extra_charge": 2.0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "message": "Supplier not found",
        })))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let status = client.supplier_import(ID, "medved").await.unwrap();
    assert_eq!(status["supplier_data"]["name"], "Medved");

    let charge = shopdesk::ExtraCharge::from_str("1,15").unwrap();
    let resp = client
        .update_supplier_charge(ID, "medved", charge)
        .await
        .unwrap();
    assert_eq!(resp["status"], "success");

    let charge = shopdesk::ExtraCharge::from_str("2").unwrap();
    match client.update_supplier_charge(ID, "nobody", charge).await {
        Err(ApiError::Rejected(msg)) => assert_eq!(msg, "Supplier not found"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_generic_request_uses_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog/search/"))
        .and(header("authorization", "Bearer A1"))
        .and(query_param("q", "winter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/catalog/item/3/"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = logged_in_client(&server).await;
    let resp = client
        .request(
            ID,
            reqwest::Method::GET,
            "/catalog/search/",
            vec![("q".to_string(), "winter".to_string())],
            None,
        )
        .await
        .unwrap();
    assert_eq!(resp, json!({"results": []}));

    // only 200 and 201 count as success
    assert!(matches!(
        client
            .request(ID, reqwest::Method::DELETE, "/catalog/item/3/", vec![], None)
            .await,
        Err(ApiError::Backend { status: 204, .. })
    ));
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let server = MockServer::start().await;
    let client = logged_in_client(&server).await;
    assert!(client.logout(ID).await.unwrap());
    assert!(!client.logout(ID).await.unwrap());
    assert!(client.store().list_authorized().await.unwrap().is_empty());
    assert!(matches!(
        client.list_orders(ID, 1).await,
        Err(ApiError::NotAuthorized(_))
    ));
}

#[tokio::test]
async fn test_conversation_flows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/token/"))
        .and(body_json(json!({"email": "staff@example.com", "password": "hunter2"})))
        .respond_with(login_ok())
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/product_import_manager/supplier_import/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let convo = ConversationStore::default();

    convo.start_login(ID);
    assert_eq!(
        convo.submit_login(ID, "staff@example.com"),
        LoginStep::AwaitingPassword
    );
    assert_eq!(
        convo.submit_password(ID, "hunter2", &client).await.unwrap(),
        LoginStep::Authorized
    );
    assert_eq!(convo.get(ID), None);
    assert!(client.store().is_authorized(ID).await.unwrap());

    convo.start_charge_edit(ID, "tochki");
    assert!(matches!(
        convo.submit_extra_charge(ID, "abc", &client).await.unwrap(),
        ChargeStep::InvalidValue(_)
    ));
    match convo.submit_extra_charge(ID, "1,2", &client).await.unwrap() {
        ChargeStep::Updated {
            supplier_slug,
            extra_charge,
            ..
        } => {
            assert_eq!(supplier_slug, "tochki");
            assert_eq!(extra_charge.value(), 1.2);
        }
        other => panic!("unexpected step: {:?}", other),
    }
    assert_eq!(convo.get(ID), None);
}
