#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use agora::auth::hash_password;
use agora::models::{NewPost, NewUser, Post, Role, User};
use agora::rate_limit::RateLimiterFacade;
use agora::repo::inmem::InMemRepo;
use agora::repo::{LikeRepo, PostRepo, UserRepo};
use agora::session::SessionStore;
use agora::{config, AppState};
use chrono::Duration;
use serial_test::serial;
use std::sync::Arc;

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

async fn seed_user(repo: &InMemRepo, email: &str, role: Role) -> User {
    repo.create_user(NewUser {
        full_name: "Test User".into(),
        email: email.into(),
        phone: "0501234567".into(),
        password: hash_password("secret1"),
        role,
    })
    .await
    .unwrap()
}

async fn seed_post(repo: &InMemRepo, author: &User) -> Post {
    repo.create_post(NewPost {
        title: "title".into(),
        content: "content".into(),
        user_id: author.id,
    })
    .await
    .unwrap()
}

#[actix_web::test]
#[serial]
async fn deletion_authorization_matrix() {
    setup_env();
    let repo = InMemRepo::new();
    let author = seed_user(&repo, "author@example.com", Role::User).await;
    let bystander = seed_user(&repo, "bystander@example.com", Role::User).await;
    let admin = seed_user(&repo, "admin@example.com", Role::Admin).await;
    let post = seed_post(&repo, &author).await;
    repo.like_post(bystander.id, post.id).await.unwrap();

    let state = app_state(&repo);
    let author_token = state.sessions.create(author.id, &author.email, author.role);
    let bystander_token = state
        .sessions
        .create(bystander.id, &bystander.email, bystander.role);
    let admin_token = state.sessions.create(admin.id, &admin.email, admin.role);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    // anonymous deletion: 401
    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{}", post.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // neither admin nor author: 403, post and its likes untouched
    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{}", post.id))
        .insert_header(("Authorization", format!("Bearer {bystander_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(repo.get_post(post.id).await.unwrap().likes, 1);
    assert_eq!(repo.count_likes(post.id).await.unwrap(), 1);

    // the author may delete their own post
    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{}", post.id))
        .insert_header(("Authorization", format!("Bearer {author_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["success"], true);
    assert!(repo.get_post(post.id).await.is_err());
    assert_eq!(repo.count_likes(post.id).await.unwrap(), 0);

    // the admin may delete anyone's post
    let other_post = seed_post(&repo, &author).await;
    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{}", other_post.id))
        .insert_header(("Authorization", format!("Bearer {admin_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert!(repo.get_post(other_post.id).await.is_err());

    // deleting a missing post: 404
    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{}", other_post.id))
        .insert_header(("Authorization", format!("Bearer {admin_token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn liking_own_post_is_refused() {
    setup_env();
    let repo = InMemRepo::new();
    let author = seed_user(&repo, "author@example.com", Role::User).await;
    let post = seed_post(&repo, &author).await;

    let state = app_state(&repo);
    let token = state.sessions.create(author.id, &author.email, author.role);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{}/like", post.id))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["message"], "You cannot like your own post");
    assert_eq!(repo.get_post(post.id).await.unwrap().likes, 0);
    assert_eq!(repo.count_likes(post.id).await.unwrap(), 0);
}

#[actix_web::test]
#[serial]
async fn admin_can_like_others_posts() {
    setup_env();
    let repo = InMemRepo::new();
    let author = seed_user(&repo, "author@example.com", Role::User).await;
    let admin = seed_user(&repo, "admin@example.com", Role::Admin).await;
    let post = seed_post(&repo, &author).await;

    let state = app_state(&repo);
    let token = state.sessions.create(admin.id, &admin.email, admin.role);
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/posts/{}/like", post.id))
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["likes"], 1);
}
