use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("storage error: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user. `Conflict` when the email is already registered.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn list_users(&self) -> RepoResult<Vec<User>>;
    async fn admin_exists(&self) -> RepoResult<bool>;
    /// Idempotent admin seeding: inserts `new` only while no admin row
    /// exists, otherwise returns the existing admin untouched.
    async fn ensure_admin(&self, new: NewUser) -> RepoResult<User>;
    /// Users whose registration date falls on the given UTC day.
    async fn count_registered_on(&self, day: chrono::NaiveDate) -> RepoResult<i64>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// Posts newest-first, joined with their author's name and role.
    async fn list_posts(&self) -> RepoResult<Vec<PostRecord>>;
    /// Removes the post's like rows and the post itself as one unit.
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait LikeRepo: Send + Sync {
    /// not-liked -> liked. Returns the new counter value. `Conflict` when a
    /// like row already exists, `NotFound` when the post does not.
    async fn like_post(&self, user_id: Id, post_id: Id) -> RepoResult<i64>;
    /// liked -> not-liked. Returns the new counter value (floored at zero).
    /// `Conflict` when the caller never liked the post.
    async fn unlike_post(&self, user_id: Id, post_id: Id) -> RepoResult<i64>;
    async fn liked_post_ids(&self, user_id: Id) -> RepoResult<Vec<Id>>;
    async fn count_likes(&self, post_id: Id) -> RepoResult<i64>;
}

pub trait Repo: UserRepo + PostRepo + LikeRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo + LikeRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        posts: HashMap<Id, Post>,
        likes: Vec<Like>,
        next_id: Id,
    }

    impl State {
        fn email_taken(&self, email: &str) -> bool {
            self.users.values().any(|u| u.email == email)
        }
        fn like_index(&self, user_id: Id, post_id: Id) -> Option<usize> {
            self.likes
                .iter()
                .position(|l| l.user_id == user_id && l.post_id == post_id)
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("AGORA_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to parse snapshot '{}': {e}; starting empty",
                            path.display()
                        );
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = &*self.snapshot_path;
            match serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        let _ = std::fs::create_dir_all(dir);
                    }
                    if let Err(e) = std::fs::write(path, bytes) {
                        log::warn!("failed to write snapshot '{}': {e}", path.display());
                    }
                }
                Err(e) => log::warn!("failed to serialize snapshot: {e}"),
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.email_taken(&new.email) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                full_name: new.full_name,
                email: new.email,
                phone: new.phone,
                password: new.password,
                registration_date: Utc::now(),
                role: new.role,
            };
            s.users.insert(id, user.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(user)
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users
                .values()
                .find(|u| u.email == email)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.users.values().cloned().collect();
            v.sort_by_key(|u| u.id);
            Ok(v)
        }

        async fn admin_exists(&self) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            Ok(s.users.values().any(|u| u.role == Role::Admin))
        }

        async fn ensure_admin(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if let Some(admin) = s.users.values().find(|u| u.role == Role::Admin) {
                return Ok(admin.clone());
            }
            let id = Self::next_id(&mut s);
            let admin = User {
                id,
                full_name: new.full_name,
                email: new.email,
                phone: new.phone,
                password: new.password,
                registration_date: Utc::now(),
                role: Role::Admin,
            };
            s.users.insert(id, admin.clone());
            drop(s);
            self.persist();
            Ok(admin)
        }

        async fn count_registered_on(&self, day: chrono::NaiveDate) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.users
                .values()
                .filter(|u| u.registration_date.date_naive() == day)
                .count() as i64)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if !s.users.contains_key(&new.user_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                title: new.title,
                content: new.content,
                user_id: new.user_id,
                date_posted: Utc::now(),
                likes: 0,
            };
            s.posts.insert(id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self) -> RepoResult<Vec<PostRecord>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<PostRecord> = s
                .posts
                .values()
                .filter_map(|p| {
                    let author = s.users.get(&p.user_id)?;
                    Some(PostRecord {
                        id: p.id,
                        title: p.title.clone(),
                        content: p.content.clone(),
                        user_id: p.user_id,
                        date_posted: p.date_posted,
                        likes: p.likes,
                        author_name: author.full_name.clone(),
                        author_role: author.role,
                    })
                })
                .collect();
            // newest first; id as tiebreaker for same-instant posts
            v.sort_by(|a, b| {
                b.date_posted
                    .cmp(&a.date_posted)
                    .then_with(|| b.id.cmp(&a.id))
            });
            Ok(v)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if s.posts.remove(&id).is_none() {
                return Err(RepoError::NotFound);
            }
            s.likes.retain(|l| l.post_id != id);
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl LikeRepo for InMemRepo {
        async fn like_post(&self, user_id: Id, post_id: Id) -> RepoResult<i64> {
            // single write lock covers check + row insert + counter bump
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            if s.like_index(user_id, post_id).is_some() {
                return Err(RepoError::Conflict);
            }
            s.likes.push(Like {
                user_id,
                post_id,
                created_at: Utc::now(),
            });
            let post = s.posts.get_mut(&post_id).ok_or(RepoError::NotFound)?;
            post.likes += 1;
            let likes = post.likes;
            drop(s);
            self.persist();
            Ok(likes)
        }

        async fn unlike_post(&self, user_id: Id, post_id: Id) -> RepoResult<i64> {
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&post_id) {
                return Err(RepoError::NotFound);
            }
            let idx = s.like_index(user_id, post_id).ok_or(RepoError::Conflict)?;
            s.likes.remove(idx);
            let post = s.posts.get_mut(&post_id).ok_or(RepoError::NotFound)?;
            post.likes = (post.likes - 1).max(0);
            let likes = post.likes;
            drop(s);
            self.persist();
            Ok(likes)
        }

        async fn liked_post_ids(&self, user_id: Id) -> RepoResult<Vec<Id>> {
            let s = self.state.read().unwrap();
            Ok(s.likes
                .iter()
                .filter(|l| l.user_id == user_id)
                .map(|l| l.post_id)
                .collect())
        }

        async fn count_likes(&self, post_id: Id) -> RepoResult<i64> {
            let s = self.state.read().unwrap();
            Ok(s.likes.iter().filter(|l| l.post_id == post_id).count() as i64)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    const POST_COLUMNS: &str = "id, title, content, user_id, date_posted, likes";
    const USER_COLUMNS: &str =
        "id, full_name, email, phone, password, registration_date, role";

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    /// Unique violations become `Conflict`, FK violations `NotFound`.
    fn constraint_err(e: sqlx::Error) -> RepoError {
        if let Some(db) = e.as_database_error() {
            if db.is_unique_violation() {
                return RepoError::Conflict;
            }
            if db.is_foreign_key_violation() {
                return RepoError::NotFound;
            }
        }
        internal(e)
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        pub async fn migrate(&self) -> RepoResult<()> {
            sqlx::migrate!("./migrations")
                .run(&self.pool)
                .await
                .map_err(|e| RepoError::Internal(e.to_string()))
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let sql = format!(
                "INSERT INTO users (full_name, email, phone, password, role) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(&new.full_name)
                .bind(&new.email)
                .bind(&new.phone)
                .bind(&new.password)
                .bind(new.role)
                .fetch_one(&self.pool)
                .await
                .map_err(constraint_err)
        }

        async fn find_user_by_email(&self, email: &str) -> RepoResult<User> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_users(&self) -> RepoResult<Vec<User>> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
            sqlx::query_as::<_, User>(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn admin_exists(&self) -> RepoResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM users WHERE role = 'admin')",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
            Ok(exists)
        }

        async fn ensure_admin(&self, new: NewUser) -> RepoResult<User> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let existing_sql =
                format!("SELECT {USER_COLUMNS} FROM users WHERE role = 'admin' LIMIT 1");
            let existing = sqlx::query_as::<_, User>(&existing_sql)
                .fetch_optional(&mut *tx)
                .await
                .map_err(internal)?;
            if let Some(admin) = existing {
                return Ok(admin);
            }
            let insert_sql = format!(
                "INSERT INTO users (full_name, email, phone, password, role) \
                 VALUES ($1, $2, $3, $4, 'admin') RETURNING {USER_COLUMNS}"
            );
            let admin = sqlx::query_as::<_, User>(&insert_sql)
                .bind(&new.full_name)
                .bind(&new.email)
                .bind(&new.phone)
                .bind(&new.password)
                .fetch_one(&mut *tx)
                .await
                .map_err(constraint_err)?;
            tx.commit().await.map_err(internal)?;
            Ok(admin)
        }

        async fn count_registered_on(&self, day: chrono::NaiveDate) -> RepoResult<i64> {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM users WHERE registration_date::date = $1",
            )
            .bind(day)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let sql = format!(
                "INSERT INTO posts (title, content, user_id) \
                 VALUES ($1, $2, $3) RETURNING {POST_COLUMNS}"
            );
            sqlx::query_as::<_, Post>(&sql)
                .bind(&new.title)
                .bind(&new.content)
                .bind(new.user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(constraint_err)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self) -> RepoResult<Vec<PostRecord>> {
            sqlx::query_as::<_, PostRecord>(
                r#"
                SELECT p.id, p.title, p.content, p.user_id, p.date_posted, p.likes,
                       u.full_name AS author_name, u.role AS author_role
                FROM posts p
                JOIN users u ON u.id = p.user_id
                ORDER BY p.date_posted DESC, p.id DESC
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            sqlx::query("DELETE FROM likes WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
            let deleted = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
            if deleted.rows_affected() == 0 {
                return Err(RepoError::NotFound); // dropping tx rolls back
            }
            tx.commit().await.map_err(internal)?;
            Ok(())
        }
    }

    #[async_trait]
    impl LikeRepo for PgRepo {
        async fn like_post(&self, user_id: Id, post_id: Id) -> RepoResult<i64> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            // The (user_id, post_id) primary key is the race backstop: two
            // concurrent likes cannot both insert.
            let inserted = sqlx::query(
                "INSERT INTO likes (user_id, post_id) VALUES ($1, $2) \
                 ON CONFLICT (user_id, post_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(constraint_err)?;
            if inserted.rows_affected() == 0 {
                return Err(RepoError::Conflict);
            }
            let likes: Option<i64> = sqlx::query_scalar(
                "UPDATE posts SET likes = likes + 1 WHERE id = $1 RETURNING likes",
            )
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?;
            let likes = likes.ok_or(RepoError::NotFound)?;
            tx.commit().await.map_err(internal)?;
            Ok(likes)
        }

        async fn unlike_post(&self, user_id: Id, post_id: Id) -> RepoResult<i64> {
            let mut tx = self.pool.begin().await.map_err(internal)?;
            let removed = sqlx::query(
                "DELETE FROM likes WHERE user_id = $1 AND post_id = $2",
            )
            .bind(user_id)
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;
            if removed.rows_affected() == 0 {
                return Err(RepoError::Conflict);
            }
            let likes: Option<i64> = sqlx::query_scalar(
                "UPDATE posts SET likes = GREATEST(likes - 1, 0) WHERE id = $1 RETURNING likes",
            )
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?;
            let likes = likes.ok_or(RepoError::NotFound)?;
            tx.commit().await.map_err(internal)?;
            Ok(likes)
        }

        async fn liked_post_ids(&self, user_id: Id) -> RepoResult<Vec<Id>> {
            sqlx::query_scalar("SELECT post_id FROM likes WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn count_likes(&self, post_id: Id) -> RepoResult<i64> {
            sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = $1")
                .bind(post_id)
                .fetch_one(&self.pool)
                .await
                .map_err(internal)
        }
    }
}
