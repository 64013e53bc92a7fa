#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use agora::auth::hash_password;
use agora::models::{NewUser, Role, User};
use agora::rate_limit::RateLimiterFacade;
use agora::repo::inmem::InMemRepo;
use agora::repo::UserRepo;
use agora::session::SessionStore;
use agora::{config, AppState, SecurityHeaders};
use chrono::Duration;
use serial_test::serial;
use std::sync::Arc;

// Fresh snapshot dir per test so repos never see each other's state.
fn setup_env() {
    std::env::set_var(
        "AGORA_DATA_DIR",
        tempfile::tempdir().unwrap().into_path(),
    );
}

fn app_state(repo: &InMemRepo) -> AppState {
    AppState {
        repo: Arc::new(repo.clone()),
        sessions: SessionStore::new(Duration::hours(1)),
        limits: RateLimiterFacade::disabled(),
    }
}

async fn seed_user(repo: &InMemRepo, email: &str) -> User {
    repo.create_user(NewUser {
        full_name: "Test User".into(),
        email: email.into(),
        phone: "0501234567".into(),
        password: hash_password("secret1"),
        role: Role::User,
    })
    .await
    .unwrap()
}

#[actix_web::test]
#[serial]
async fn post_like_unlike_flow() {
    setup_env();
    let repo = InMemRepo::new();
    let author = seed_user(&repo, "author@example.com").await;
    let fan = seed_user(&repo, "fan@example.com").await;
    let state = app_state(&repo);
    let author_token = state.sessions.create(author.id, &author.email, author.role);
    let fan_token = state.sessions.create(fan.id, &fan.email, fan.role);
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    // anonymous post creation is refused
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .set_json(&serde_json::json!({"title": "Hello", "content": "World"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // author publishes a post
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {author_token}")))
        .set_json(&serde_json::json!({"title": "Hello", "content": "World"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let created: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(created["success"], true);
    let post_id = created["post_id"].as_i64().unwrap();

    // anonymous listing: no flags set
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let post = &posts.as_array().unwrap()[0];
    assert_eq!(post["author"], "Test User");
    assert_eq!(post["likes"], 0);
    assert_eq!(post["liked_by_me"], false);
    assert_eq!(post["is_author"], false);

    // fan likes the post
    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/like"))
        .insert_header(("Authorization", format!("Bearer {fan_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let liked: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(liked["likes"], 1);

    // a second like from the same user is a validation error
    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/like"))
        .insert_header(("Authorization", format!("Bearer {fan_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "You have already liked this post");

    // flags follow the requesting session
    let req = test::TestRequest::get()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {fan_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let post = &posts.as_array().unwrap()[0];
    assert_eq!(post["liked_by_me"], true);
    assert_eq!(post["is_author"], false);
    assert_eq!(post["likes"], 1);

    let req = test::TestRequest::get()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {author_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let post = &posts.as_array().unwrap()[0];
    assert_eq!(post["liked_by_me"], false);
    assert_eq!(post["is_author"], true);

    // unlike brings the counter back down
    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/unlike"))
        .insert_header(("Authorization", format!("Bearer {fan_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let unliked: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(unliked["likes"], 0);

    // a second unlike is refused
    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{post_id}/unlike"))
        .insert_header(("Authorization", format!("Bearer {fan_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["message"], "You have not liked this post");

    // liking a missing post is a 404
    let req = test::TestRequest::post()
        .uri("/api/posts/9999/like")
        .insert_header(("Authorization", format!("Bearer {fan_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn create_post_validation_and_escaping() {
    setup_env();
    let repo = InMemRepo::new();
    let user = seed_user(&repo, "writer@example.com").await;
    let state = app_state(&repo);
    let token = state.sessions.create(user.id, &user.email, user.role);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    // empty title
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&serde_json::json!({"title": "", "content": "x"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // title over 200 characters
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&serde_json::json!({"title": "x".repeat(201), "content": "y"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // markup is escaped before storage
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(&serde_json::json!({"title": "  <b>hi</b>  ", "content": "a & b"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    let posts: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let post = &posts.as_array().unwrap()[0];
    assert_eq!(post["title"], "&lt;b&gt;hi&lt;/b&gt;");
    assert_eq!(post["content"], "a &amp; b");
}

#[actix_web::test]
#[serial]
async fn users_stats_and_me_endpoints() {
    setup_env();
    let repo = InMemRepo::new();
    let user = seed_user(&repo, "one@example.com").await;
    seed_user(&repo, "two@example.com").await;
    let state = app_state(&repo);
    let token = state.sessions.create(user.id, &user.email, user.role);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/users").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let users: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["fullName"], "Test User");
    assert_eq!(users[0]["role"], "user");
    assert!(users[0].get("password").is_none());

    let req = test::TestRequest::get().uri("/api/stats").to_request();
    let resp = test::call_service(&app, req).await;
    let stats: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(stats["total_users"], 2);
    assert_eq!(stats["today_users"], 2);

    let req = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let me: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(me["email"], "one@example.com");
    assert_eq!(me["role"], "user");

    let req = test::TestRequest::get().uri("/api/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}
