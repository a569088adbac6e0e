mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{ADMIN, ADMIN_PASSWORD, json_body, setup, setup_with};
use futures::future::join_all;
use serde_json::json;
use server_panel::entities::Role;
use std::net::SocketAddr;

#[tokio::test]
async fn test_path_traversal_is_forbidden() {
    let t = setup().await;
    let token = t.admin_token().await;
    std::fs::write(t.dir.path().join("outside.txt"), b"secret").unwrap();

    for uri in [
        "/files?path=../",
        "/files?path=../../etc",
        "/files?path=/etc",
        "/files/download?path=../outside.txt",
        "/files/download?path=/etc/passwd",
    ] {
        let response = t.get(uri, &token).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "uri {}", uri);
        assert_eq!(json_body(response).await, json!({ "error": "Access denied" }));
    }

    let response = t.upload(&token, "../escape.txt", None, b"pwned").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!t.dir.path().join("escape.txt").exists());

    let response = t
        .json_request("DELETE", "/files", &token, json!({ "path": "../outside.txt" }))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(t.dir.path().join("outside.txt").exists());

    let response = t
        .json_request(
            "POST",
            "/files/directories",
            &token,
            json!({ "path": "a/../../b" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_is_forbidden() {
    let t = setup().await;
    let token = t.admin_token().await;
    let outside = t.dir.path().join("outside");
    std::fs::create_dir(&outside).unwrap();
    std::fs::write(outside.join("secret.txt"), b"secret").unwrap();
    std::os::unix::fs::symlink(&outside, t.state.files.root().join("link")).unwrap();

    let response = t.get("/files?path=link", &token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = t.get("/files/download?path=link/secret.txt", &token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = t.upload(&token, "link/new.txt", None, b"x").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!outside.join("new.txt").exists());

    // The link itself is not listed
    let response = t.get("/files", &token).await;
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let t = setup().await;

    for (method, uri) in [
        ("GET", "/files"),
        ("GET", "/files/download?path=a.txt"),
        ("DELETE", "/files"),
        ("POST", "/files/directories"),
        ("POST", "/files/upload"),
        ("GET", "/auth/me"),
        ("POST", "/auth/logout"),
        ("GET", "/users"),
    ] {
        let response = t
            .send(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{} {}",
            method,
            uri
        );
    }

    let response = t.get("/files", "forged-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let t = setup().await;

    let wrong_password = t.login(ADMIN, "not-the-password").await;
    let wrong_status = wrong_password.status();
    let wrong_body = json_body(wrong_password).await;

    let unknown_user = t.login("nobody", ADMIN_PASSWORD).await;
    let unknown_status = unknown_user.status();
    let unknown_body = json_body(unknown_user).await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, unknown_status);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body, json!({ "error": "Invalid credentials" }));
}

#[tokio::test]
async fn test_repeated_failures_are_throttled() {
    let t = setup().await;
    t.state
        .credentials
        .create_user("operator", "operator-password", Role::User)
        .await
        .unwrap();
    let attacker: SocketAddr = "203.0.113.10:41000".parse().unwrap();
    let bystander: SocketAddr = "198.51.100.4:52000".parse().unwrap();

    for _ in 0..3 {
        let response = t.login_from(attacker, None, ADMIN, "wrong-password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Locked out even with the right password
    let response = t.login_from(attacker, None, ADMIN, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Other clients can still reach other accounts
    let response = t
        .login_from(bystander, None, "operator", "operator-password")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rotating_forwarded_for_is_still_throttled() {
    let t = setup().await;
    let peer: SocketAddr = "203.0.113.10:41000".parse().unwrap();

    let mut statuses = Vec::new();
    for i in 0..12 {
        let forwarded = format!("10.9.9.{}", i);
        let response = t
            .login_from(peer, Some(&forwarded), "nobody", "wrong-password")
            .await;
        statuses.push(response.status());
    }

    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::UNAUTHORIZED)
            .count(),
        3
    );
    assert!(
        statuses[3..]
            .iter()
            .all(|s| *s == StatusCode::TOO_MANY_REQUESTS),
        "{:?}",
        statuses
    );
}

#[tokio::test]
async fn test_identifier_is_throttled_across_addresses() {
    let t = setup().await;

    for i in 0..3 {
        let peer: SocketAddr = format!("192.0.2.{}:40000", i + 1).parse().unwrap();
        let response = t.login_from(peer, None, ADMIN, "wrong-password").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let fresh_peer: SocketAddr = "192.0.2.200:40000".parse().unwrap();
    let response = t
        .login_from(fresh_peer, None, ADMIN, ADMIN_PASSWORD)
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_for_is_honored_behind_trusted_proxy() {
    let proxy: SocketAddr = "127.0.0.1:8080".parse().unwrap();
    let t = setup_with(|config| config.trusted_proxies = vec![proxy.ip()]).await;
    t.state
        .credentials
        .create_user("operator", "operator-password", Role::User)
        .await
        .unwrap();

    for _ in 0..3 {
        let response = t
            .login_from(proxy, Some("203.0.113.50"), "nobody", "wrong-password")
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = t
        .login_from(proxy, Some("203.0.113.50"), "operator", "operator-password")
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client behind the same proxy is its own bucket
    let response = t
        .login_from(proxy, Some("203.0.113.51"), "operator", "operator-password")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_guesses_share_one_budget() {
    let t = setup().await;
    let peer: SocketAddr = "203.0.113.10:41000".parse().unwrap();

    let guesses = (0..10).map(|i| {
        let password = format!("guess-{}", i);
        let t = &t;
        async move { t.login_from(peer, None, ADMIN, &password).await.status() }
    });
    let statuses = join_all(guesses).await;

    let checked = statuses
        .iter()
        .filter(|s| **s == StatusCode::UNAUTHORIZED)
        .count();
    let refused = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(checked, 3, "{:?}", statuses);
    assert_eq!(refused, 7, "{:?}", statuses);
}

#[tokio::test]
async fn test_session_cookie_secure_flag_follows_config() {
    let t = setup_with(|config| config.secure_cookies = true).await;
    let response = t.login(ADMIN, ADMIN_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.ends_with("; Secure"), "{}", cookie);

    let t = setup().await;
    let response = t.login(ADMIN, ADMIN_PASSWORD).await;
    let cookie = response.headers().get(header::SET_COOKIE).unwrap();
    assert!(!cookie.to_str().unwrap().contains("Secure"));
}

#[tokio::test]
async fn test_security_headers() {
    let t = setup().await;
    let response = t
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;

    let headers = response.headers();
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    assert!(headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, must-revalidate"
    );

    let response = t
        .send(
            Request::builder()
                .method("TRACE")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
