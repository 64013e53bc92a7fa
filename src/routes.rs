use std::collections::HashSet;
use std::sync::Arc;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie};
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::{hash_password, verify_password, Auth, ADMIN_EMAIL};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::session::{SessionStore, SESSION_COOKIE};
use crate::validate::{first_message, sanitize_post, validate_phone};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/logout").route(web::get().to(logout)))
        .service(
            web::scope("/api")
                .service(web::resource("/users").route(web::get().to(list_users)))
                .service(
                    web::resource("/posts")
                        .route(web::get().to(list_posts))
                        .route(web::post().to(create_post)),
                )
                .service(web::resource("/posts/{id}/like").route(web::post().to(like_post)))
                .service(web::resource("/posts/{id}/unlike").route(web::post().to(unlike_post)))
                .service(web::resource("/posts/{id}").route(web::delete().to(delete_post)))
                .service(web::resource("/me").route(web::get().to(me)))
                .service(web::resource("/stats").route(web::get().to(stats))),
        );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub sessions: SessionStore,
    pub limits: RateLimiterFacade,
}

fn client_ip(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string()
}

/// Form endpoints surface outcomes as a flash query parameter on `/`,
/// matching what the server-rendered frontend expects.
fn redirect_with_flash(message: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((
            header::LOCATION,
            format!("/?flash={}", urlencoding::encode(message)),
        ))
        .finish()
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .finish()
}

fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::seconds(0))
        .finish()
}

// ---------------- Authentication ----------------------------------

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct RegisterForm {
    #[serde(rename = "fullName")]
    #[validate(length(min = 2, max = 100, message = "Full name must be 2-100 characters"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

pub async fn register(
    req: HttpRequest,
    data: web::Data<AppState>,
    form: web::Form<RegisterForm>,
) -> HttpResponse {
    if !data.limits.allow_register(&client_ip(&req)) {
        return redirect_with_flash("Too many registration attempts, try again later");
    }
    if let Err(errors) = form.validate() {
        return redirect_with_flash(&first_message(&errors));
    }

    // The reserved admin email may be claimed only while no admin row exists.
    if form.email == ADMIN_EMAIL {
        match data.repo.admin_exists().await {
            Ok(true) => {
                return redirect_with_flash("Admin already exists! Please use a different email.")
            }
            Ok(false) => {}
            Err(e) => {
                log::error!("admin lookup failed: {e}");
                return redirect_with_flash("Registration error, please try again");
            }
        }
    }

    let new_user = NewUser {
        full_name: form.full_name.trim().to_string(),
        email: form.email.trim().to_string(),
        phone: form.phone.trim().to_string(),
        password: hash_password(&form.password),
        role: Role::User, // registration never mints admins
    };
    let user = match data.repo.create_user(new_user).await {
        Ok(u) => u,
        Err(RepoError::Conflict) => {
            return redirect_with_flash("A user with this email already exists. Please log in.")
        }
        Err(e) => {
            log::error!("registration failed: {e}");
            return redirect_with_flash("Registration error, please try again");
        }
    };

    metrics::increment_counter!("agora_users_registered_total");
    let token = data.sessions.create(user.id, &user.email, user.role);
    let mut resp = redirect_with_flash("Registration successful! You are now logged in.");
    if let Err(e) = resp.add_cookie(&session_cookie(token)) {
        log::error!("failed to set session cookie: {e}");
    }
    resp
}

pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    form: web::Form<LoginForm>,
) -> HttpResponse {
    if !data.limits.allow_login(&client_ip(&req)) {
        return redirect_with_flash("Too many login attempts, try again later");
    }
    let user = match data.repo.find_user_by_email(form.email.trim()).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => return redirect_with_flash("Invalid email or password"),
        Err(e) => {
            log::error!("login lookup failed: {e}");
            return redirect_with_flash("Login error, please try again");
        }
    };
    if !verify_password(&form.password, &user.password) {
        return redirect_with_flash("Invalid email or password");
    }

    let token = data.sessions.create(user.id, &user.email, user.role);
    let mut resp = redirect_with_flash(&format!("Welcome, {}!", user.full_name));
    if let Err(e) = resp.add_cookie(&session_cookie(token)) {
        log::error!("failed to set session cookie: {e}");
    }
    resp
}

pub async fn logout(req: HttpRequest, data: web::Data<AppState>) -> HttpResponse {
    if let Some(token) = crate::auth::session_token(&req) {
        data.sessions.remove(&token);
    }
    let mut resp = redirect_with_flash("You have been logged out.");
    if let Err(e) = resp.add_cookie(&expired_session_cookie()) {
        log::error!("failed to clear session cookie: {e}");
    }
    resp
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub id: Id,
    pub email: String,
    pub role: Role,
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current session info", body = MeResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn me(auth: Auth) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(MeResponse {
        id: auth.0.user_id,
        email: auth.0.email.clone(),
        role: auth.0.role,
    }))
}

// ---------------- Users -------------------------------------------

#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "Registered users", body = [UserSummary]))
)]
pub async fn list_users(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let users = data.repo.list_users().await?;
    let out: Vec<UserSummary> = users.iter().map(UserSummary::from).collect();
    Ok(HttpResponse::Ok().json(out))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    pub total_users: i64,
    pub today_users: i64,
}

#[utoipa::path(
    get,
    path = "/api/stats",
    responses((status = 200, description = "Registration stats", body = StatsResponse))
)]
pub async fn stats(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let total_users = data.repo.list_users().await?.len() as i64;
    let today_users = data
        .repo
        .count_registered_on(chrono::Utc::now().date_naive())
        .await?;
    Ok(HttpResponse::Ok().json(StatsResponse {
        total_users,
        today_users,
    }))
}

// ---------------- Posts -------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct NewPostRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PostCreatedResponse {
    pub success: bool,
    pub post_id: Id,
}

#[utoipa::path(
    get,
    path = "/api/posts",
    responses((status = 200, description = "Posts newest-first with session flags", body = [PostView]))
)]
pub async fn list_posts(
    auth: Option<Auth>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let records = data.repo.list_posts().await?;
    let (liked, me): (HashSet<Id>, Option<Id>) = match &auth {
        Some(a) => (
            data.repo
                .liked_post_ids(a.0.user_id)
                .await?
                .into_iter()
                .collect(),
            Some(a.0.user_id),
        ),
        None => (HashSet::new(), None),
    };
    let out: Vec<PostView> = records
        .iter()
        .map(|r| PostView::annotate(r, liked.contains(&r.id), me == Some(r.user_id)))
        .collect();
    Ok(HttpResponse::Ok().json(out))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = NewPostRequest,
    responses(
        (status = 200, description = "Post created", body = PostCreatedResponse),
        (status = 400, description = "Empty or oversized fields"),
        (status = 401, description = "No active session")
    )
)]
pub async fn create_post(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewPostRequest>,
) -> Result<HttpResponse, ApiError> {
    if !data.limits.allow_post(&client_ip(&req)) {
        return Err(ApiError::TooManyRequests);
    }
    let (title, content) =
        sanitize_post(&payload.title, &payload.content).map_err(ApiError::Validation)?;
    let post = data
        .repo
        .create_post(NewPost {
            title,
            content,
            user_id: auth.0.user_id,
        })
        .await?;
    metrics::increment_counter!("agora_posts_created_total");
    Ok(HttpResponse::Ok().json(PostCreatedResponse {
        success: true,
        post_id: post.id,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post and its likes removed"),
        (status = 401, description = "No active session"),
        (status = 403, description = "Neither admin nor author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let post = data
        .repo
        .get_post(post_id)
        .await
        .map_err(|_| ApiError::NotFound)?;
    // admin may delete anything; the author their own post
    if !auth.0.is_admin() && post.user_id != auth.0.user_id {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_post(post_id).await?;
    metrics::increment_counter!("agora_posts_deleted_total");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

// ---------------- Like / unlike -----------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LikeResponse {
    pub success: bool,
    pub likes: i64,
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/like",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Like recorded", body = LikeResponse),
        (status = 400, description = "Already liked or own post"),
        (status = 401, description = "No active session"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn like_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    let post = data
        .repo
        .get_post(post_id)
        .await
        .map_err(|_| ApiError::NotFound)?;
    if post.user_id == auth.0.user_id {
        return Err(ApiError::Validation(
            "You cannot like your own post".to_string(),
        ));
    }
    let likes = match data.repo.like_post(auth.0.user_id, post_id).await {
        Ok(n) => n,
        Err(RepoError::Conflict) => {
            return Err(ApiError::Validation(
                "You have already liked this post".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    metrics::increment_counter!("agora_likes_total");
    Ok(HttpResponse::Ok().json(LikeResponse {
        success: true,
        likes,
    }))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/unlike",
    params(("id" = i64, Path, description = "Post id")),
    responses(
        (status = 200, description = "Like removed", body = LikeResponse),
        (status = 400, description = "Post was not liked by the caller"),
        (status = 401, description = "No active session"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn unlike_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post_id = path.into_inner();
    data.repo
        .get_post(post_id)
        .await
        .map_err(|_| ApiError::NotFound)?;
    let likes = match data.repo.unlike_post(auth.0.user_id, post_id).await {
        Ok(n) => n,
        Err(RepoError::Conflict) => {
            return Err(ApiError::Validation(
                "You have not liked this post".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    metrics::increment_counter!("agora_unlikes_total");
    Ok(HttpResponse::Ok().json(LikeResponse {
        success: true,
        likes,
    }))
}
