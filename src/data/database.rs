//! SQLite database operations
//!
//! All database access goes through this module.
//! `Database` implements every store trait the federation engine consumes.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use super::store::{FollowerStore, KeyPairStore, PostStore, ProfileStore};
use crate::error::AppError;

/// Database connection pool wrapper
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        // Create connection string
        let connection_string = format!("sqlite:{}?mode=rwc", path.display());

        // Create connection pool
        let pool = SqlitePool::connect(&connection_string).await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    /// Insert a local post and assign its URI inside one IMMEDIATE transaction.
    async fn insert_local_post_tx(
        &self,
        post: &NewPost,
        notes_base: &str,
    ) -> Result<Post, AppError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result: Result<Post, AppError> = async {
            let inserted = sqlx::query(
                r#"
                INSERT INTO posts (
                    uri, content_warning, content, author_name, author_handle,
                    origin_host, visibility, is_local, created_at
                ) VALUES (NULL, ?, ?, ?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(&post.content_warning)
            .bind(&post.content)
            .bind(&post.author_name)
            .bind(&post.author_handle)
            .bind(&post.origin_host)
            .bind(post.visibility.as_str())
            .bind(post.created_at)
            .execute(&mut *conn)
            .await?;

            let id = inserted.last_insert_rowid();
            let uri = format!("{}/{}", notes_base.trim_end_matches('/'), id);

            sqlx::query("UPDATE posts SET uri = ? WHERE id = ?")
                .bind(&uri)
                .bind(id)
                .execute(&mut *conn)
                .await?;

            let stored = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?;

            Ok(stored)
        }
        .await;

        match result {
            Ok(stored) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(stored)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }
}

// =============================================================================
// Profile
// =============================================================================

#[async_trait]
impl ProfileStore for Database {
    async fn get_profile(&self) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT handle, display_name, bio, avatar_url, updated_at FROM profile WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn seed_profile(&self, profile: &Profile) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO profile (id, handle, display_name, bio, avatar_url, updated_at)
            VALUES (1, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&profile.handle)
        .bind(&profile.display_name)
        .bind(&profile.bio)
        .bind(&profile.avatar_url)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Followers
// =============================================================================

#[async_trait]
impl FollowerStore for Database {
    async fn upsert_follower(&self, actor_iri: &str, inbox_iri: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO followers (actor_iri, inbox_iri, followed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(actor_iri) DO UPDATE SET inbox_iri = excluded.inbox_iri
            "#,
        )
        .bind(actor_iri)
        .bind(inbox_iri)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_follower(&self, actor_iri: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM followers WHERE actor_iri = ?")
            .bind(actor_iri)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_followers(&self) -> Result<Vec<Follower>, AppError> {
        let followers = sqlx::query_as::<_, Follower>(
            "SELECT actor_iri, inbox_iri, followed_at FROM followers ORDER BY followed_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(followers)
    }

    async fn count_followers(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM followers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Posts
// =============================================================================

#[async_trait]
impl PostStore for Database {
    async fn insert_local_post(&self, post: &NewPost, notes_base: &str) -> Result<Post, AppError> {
        self.insert_local_post_tx(post, notes_base).await
    }

    async fn insert_federated_post(&self, post: &NewPost) -> Result<bool, AppError> {
        let uri = post
            .uri
            .as_deref()
            .ok_or_else(|| AppError::Parse("federated post requires a URI".to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO posts (
                uri, content_warning, content, author_name, author_handle,
                origin_host, visibility, is_local, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(uri) DO NOTHING
            "#,
        )
        .bind(uri)
        .bind(&post.content_warning)
        .bind(&post.content)
        .bind(&post.author_name)
        .bind(&post.author_handle)
        .bind(&post.origin_host)
        .bind(post.visibility.as_str())
        .bind(post.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    async fn get_post_by_uri(&self, uri: &str) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE uri = ?")
            .bind(uri)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    async fn update_post_content(
        &self,
        uri: &str,
        content: &str,
        content_warning: Option<String>,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE posts SET content = ?, content_warning = ? WHERE uri = ? AND is_local = 0")
                .bind(content)
                .bind(content_warning)
                .bind(uri)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_local_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>(
            "DELETE FROM posts WHERE id = ? AND is_local = 1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn delete_federated_post(&self, uri: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM posts WHERE uri = ? AND is_local = 0")
            .bind(uri)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn adjust_counter(
        &self,
        uri: &str,
        counter: PostCounter,
        delta: i64,
    ) -> Result<bool, AppError> {
        let column = counter.column();
        let query = format!(
            "UPDATE posts SET {column} = MAX({column} + ?, 0) WHERE uri = ?",
            column = column
        );
        let result = sqlx::query(&query)
            .bind(delta)
            .bind(uri)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_listed_local_posts(&self, limit: i64) -> Result<Vec<Post>, AppError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE is_local = 1 AND visibility IN ('public', 'unlisted')
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    async fn count_local_posts(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE is_local = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Signing keys
// =============================================================================

#[async_trait]
impl KeyPairStore for Database {
    async fn get_key_pair(&self, actor_iri: &str) -> Result<Option<KeyPair>, AppError> {
        let key_pair = sqlx::query_as::<_, KeyPair>(
            "SELECT actor_iri, public_key_pem, private_key_pem, created_at FROM actor_keys WHERE actor_iri = ?",
        )
        .bind(actor_iri)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key_pair)
    }

    async fn insert_key_pair_if_absent(&self, key_pair: &KeyPair) -> Result<KeyPair, AppError> {
        sqlx::query(
            r#"
            INSERT INTO actor_keys (actor_iri, public_key_pem, private_key_pem, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(actor_iri) DO NOTHING
            "#,
        )
        .bind(&key_pair.actor_iri)
        .bind(&key_pair.public_key_pem)
        .bind(&key_pair.private_key_pem)
        .bind(key_pair.created_at)
        .execute(&self.pool)
        .await?;

        // Re-read so a concurrent winner's pair is returned to every caller.
        self.get_key_pair(&key_pair.actor_iri)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("key pair vanished after insert")))
    }
}
