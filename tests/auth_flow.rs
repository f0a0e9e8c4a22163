mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_json, TestApp};

#[tokio::test]
async fn signup_login_and_me_flow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let signup = app
        .post_json(
            "/api/auth/signup",
            &serde_json::json!({
                "email": "Producer@Example.com",
                "password": "stagepass",
                "full_name": "Pat Producer"
            }),
            None,
        )
        .await?;
    assert_eq!(signup.status(), StatusCode::CREATED);
    let signup_body = body_to_json(signup.into_body()).await?;
    assert_eq!(signup_body["user"]["email"], "producer@example.com");
    assert!(signup_body["access_token"].as_str().is_some());

    let token = app.login_token("producer@example.com", "stagepass").await?;

    let me = app.get("/api/auth/me", Some(&token)).await?;
    assert_eq!(me.status(), StatusCode::OK);
    let me_body = body_to_json(me.into_body()).await?;
    assert_eq!(me_body["email"], "producer@example.com");

    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_password() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("crew@example.com", "rightpass").await?;

    let response = app
        .post_json(
            "/api/auth/login",
            &serde_json::json!({"email": "crew@example.com", "password": "wrongpass"}),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn signup_rejects_duplicate_email() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("taken@example.com", "firstpass").await?;

    let response = app
        .post_json(
            "/api/auth/signup",
            &serde_json::json!({"email": "taken@example.com", "password": "secondpass"}),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn me_requires_a_token() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app.get("/api/auth/me", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
