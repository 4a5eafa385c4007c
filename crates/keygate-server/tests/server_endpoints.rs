use std::collections::BTreeMap;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use keygate_auth::types::{ClientType, GrantFlow};
use keygate_server::{AppConfig, AppState, ClientSettings, UserSettings, build_app};
use serde_json::Value;
use tower::ServiceExt;

fn client(id: &str, secret: Option<&str>, flows: Vec<GrantFlow>) -> ClientSettings {
    ClientSettings {
        client_id: id.to_string(),
        secret: secret.map(str::to_string),
        name: Some(format!("{id} application")),
        logo: None,
        client_type: if secret.is_some() {
            ClientType::Confidential
        } else {
            ClientType::Public
        },
        redirect_uris: vec!["https://app.example.com/cb".to_string()],
        allowed_flows: flows,
        scopes: None,
        target_group: None,
        active: true,
    }
}

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.auth.issuer = "https://idp.example.com".into();
    cfg.auth.tokens.signing_algorithm = "ES384".into();
    cfg.clients = vec![
        client(
            "webapp",
            Some("webapp-secret"),
            vec![GrantFlow::AuthorizationCode],
        ),
        client(
            "service",
            Some("service-secret"),
            vec![GrantFlow::ClientCredentials],
        ),
    ];
    let mut attributes = BTreeMap::new();
    attributes.insert("email".to_string(), vec!["alice@example.com".to_string()]);
    cfg.users.insert(
        "alice".to_string(),
        UserSettings {
            attributes,
            groups: vec!["/staff".to_string()],
        },
    );
    cfg
}

fn app() -> (Router, AppState) {
    let cfg = test_config();
    let state = AppState::from_config(&cfg).expect("state");
    let app = build_app(&cfg, &state).expect("app");
    (app, state)
}

fn basic(client_id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{secret}")))
}

fn post_form(uri: &str, body: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_as(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-authenticated-user", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn location(response: &Response<Body>) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

fn query_param(location: &str, name: &str) -> String {
    let query = location.split_once('?').map(|(_, q)| q).unwrap_or_default();
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn jwks_publishes_the_signing_key() {
    let (app, state) = app();
    let response = app
        .oneshot(get_as("/oauth2/jwks", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let keys = body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kid"], state.auth.jwt.kid());
    assert_eq!(keys[0]["alg"], "ES384");
}

#[tokio::test]
async fn client_credentials_token_is_introspectable() {
    let (app, _) = app();
    let credentials = basic("service", "service-secret");

    let response = app
        .clone()
        .oneshot(post_form(
            "/oauth2/token",
            "grant_type=client_credentials&scope=profile",
            Some(&credentials),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    let access_token = body["access_token"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post_form(
            "/oauth2/introspect",
            &format!("token={access_token}"),
            Some(&credentials),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["active"], true);
    assert_eq!(body["client_id"], "service");

    let response = app
        .clone()
        .oneshot(post_form(
            "/oauth2/revoke",
            &format!("token={access_token}"),
            Some(&credentials),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post_form(
            "/oauth2/introspect",
            &format!("token={access_token}"),
            Some(&credentials),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["active"], false);
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let (app, _) = app();
    let response = app
        .oneshot(post_form(
            "/oauth2/token",
            "grant_type=client_credentials",
            Some(&basic("service", "guess")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn authorization_code_flow_through_trusted_header() {
    let (app, _) = app();

    // Anonymous request: stored and handed to the login service
    let response = app
        .clone()
        .oneshot(get_as(
            "/oauth2/authorize?response_type=code&client_id=webapp\
             &scope=openid%20email&state=s1&nonce=n1",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let handle = query_param(&location(&response), "context");

    // Resuming needs the authenticated user
    let resume = format!("/oauth2/authorize/resume?context={handle}");
    let response = app.clone().oneshot(get_as(&resume, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get_as(&resume, Some("alice")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let prompt = body_json(response).await;
    assert_eq!(prompt["client_name"], "webapp application");

    let mut decision = post_form(
        "/oauth2/authorize/decision",
        &format!("context={handle}&action=accept"),
        None,
    );
    decision
        .headers_mut()
        .insert("x-authenticated-user", "alice".parse().unwrap());
    let response = app.clone().oneshot(decision).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let callback = location(&response);
    assert!(callback.starts_with("https://app.example.com/cb?"));
    assert_eq!(query_param(&callback, "state"), "s1");
    let code = query_param(&callback, "code");

    let response = app
        .oneshot(post_form(
            "/oauth2/token",
            &format!("grant_type=authorization_code&code={code}"),
            Some(&basic("webapp", "webapp-secret")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["access_token"].is_string());
    assert!(body["id_token"].is_string());
}
