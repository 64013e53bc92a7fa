use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Always i64 so both backends agree on id width
pub type Id = i64;

/// Display format used by the JSON API for timestamps.
pub const DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    // sha256 hex digest. Serialized only into the inmem snapshot; the API
    // layer exposes users through UserSummary, which has no password field.
    pub password: String,
    pub registration_date: DateTime<Utc>,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password: String, // already hashed by the caller
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub user_id: Id,
    pub date_posted: DateTime<Utc>,
    pub likes: i64, // denormalized; kept in sync with the likes table
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub user_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Like {
    pub user_id: Id,
    pub post_id: Id,
    pub created_at: DateTime<Utc>,
}

/// A post joined with its author, as the list endpoint needs it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostRecord {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub user_id: Id,
    pub date_posted: DateTime<Utc>,
    pub likes: i64,
    pub author_name: String,
    pub author_role: Role,
}

/// Wire shape of `GET /api/users` entries. Field names follow the
/// frontend contract (`fullName`, `registration_date` pre-formatted).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: Id,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub registration_date: String,
}

impl From<&User> for UserSummary {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            full_name: u.full_name.clone(),
            email: u.email.clone(),
            phone: u.phone.clone(),
            role: u.role,
            registration_date: u.registration_date.format(DATE_FORMAT).to_string(),
        }
    }
}

/// Wire shape of `GET /api/posts` entries, annotated with the requesting
/// session's relationship to the post.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PostView {
    pub id: Id,
    pub title: String,
    pub content: String,
    pub date_posted: String,
    pub author: String,
    pub author_role: Role,
    pub likes: i64,
    pub liked_by_me: bool,
    pub is_author: bool,
}

impl PostView {
    pub fn annotate(rec: &PostRecord, liked_by_me: bool, is_author: bool) -> Self {
        Self {
            id: rec.id,
            title: rec.title.clone(),
            content: rec.content.clone(),
            date_posted: rec.date_posted.format(DATE_FORMAT).to_string(),
            author: rec.author_name.clone(),
            author_role: rec.author_role,
            likes: rec.likes,
            liked_by_me,
            is_author,
        }
    }
}
