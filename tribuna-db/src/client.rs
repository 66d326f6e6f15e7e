use crate::record::{
    CommentRecord, CredentialsRecord, GroupRecord, PostRecord, SessionRecord, UserRecord,
};
use sqlx::{
    SqlitePool, query, query_as, query_scalar,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use thiserror::Error;
use time::{PrimitiveDateTime, UtcDateTime};
use tribuna_common::{
    model::{
        Id, ModelValidationError,
        auth::{Authentication, AuthTokenHash},
        comment::{Comment, CommentMarker, CommentText},
        group::{Group, GroupMarker, Slug},
        post::{Post, PostMarker, PostText},
        user::{User, UserMarker, Username},
    },
    pagination::PageBounds,
};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Error running migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("A uniqueness constraint was violated")]
    UniqueViolation,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// A verified user row for the login flow; the hash never leaves this crate's
/// callers' login path.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct StoredCredentials {
    pub user: User,
    pub password_hash: String,
}

const SELECT_POSTS: &str = "
    SELECT
        posts.id, posts.text, posts.image, posts.created_at,
        users.id AS author_id, users.username AS author_username,
        g.id AS group_id, g.title AS group_title,
        g.slug AS group_slug, g.description AS group_description
    FROM posts
    JOIN users ON users.id = posts.author_id
    LEFT JOIN \"groups\" g ON g.id = posts.group_id
";

#[derive(Debug)]
pub struct DbClient {
    pool: SqlitePool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `url` and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // An in-memory database only lives as long as its one connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let client = Self::new(pool);
        client.migrate().await?;
        Ok(client)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub async fn create_user(
        &self,
        username: &Username,
        password_hash: &str,
    ) -> Result<Id<UserMarker>> {
        let id = query_scalar::<_, i64>(
            "INSERT INTO users (username, password_hash) VALUES (?, ?) RETURNING id",
        )
        .bind(username.get())
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation_or_other)?;

        Ok(id.into())
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record =
            query_as::<_, UserRecord>("SELECT id, username FROM users WHERE id = ?")
                .bind(user_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    pub async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record =
            query_as::<_, UserRecord>("SELECT id, username FROM users WHERE username = ?")
                .bind(username.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(record.map(User::try_from).transpose()?)
    }

    pub async fn fetch_credentials(
        &self,
        username: &Username,
    ) -> Result<Option<StoredCredentials>> {
        let record = query_as::<_, CredentialsRecord>(
            "SELECT id, username, password_hash FROM users WHERE username = ?",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        record
            .map(|record| {
                Ok(StoredCredentials {
                    user: User {
                        id: record.id.into(),
                        username: Username::new(record.username)
                            .map_err(ModelValidationError::from)?,
                    },
                    password_hash: record.password_hash,
                })
            })
            .transpose()
    }

    pub async fn create_session(&self, authentication: &Authentication) -> Result<()> {
        query(
            "
            INSERT INTO sessions (user_id, token_hash, created_at, expires_after_seconds)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(authentication.user.get())
        .bind(&authentication.token_hash.0[..])
        .bind(as_primitive(authentication.created_at))
        .bind(
            authentication
                .expires_after
                .map(|duration| duration.get().whole_seconds()),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fetch_session(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>> {
        let record = query_as::<_, SessionRecord>(
            "
            SELECT user_id, token_hash, created_at, expires_after_seconds
            FROM sessions
            WHERE token_hash = ?
            ",
        )
        .bind(&token_hash.0[..])
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Authentication::try_from).transpose()?)
    }

    pub async fn create_group(
        &self,
        title: &str,
        slug: &Slug,
        description: &str,
    ) -> Result<Id<GroupMarker>> {
        let id = query_scalar::<_, i64>(
            "INSERT INTO \"groups\" (title, slug, description) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(title)
        .bind(slug.get())
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation_or_other)?;

        Ok(id.into())
    }

    pub async fn fetch_group_by_slug(&self, slug: &Slug) -> Result<Option<Group>> {
        let record = query_as::<_, GroupRecord>(
            "SELECT id, title, slug, description FROM \"groups\" WHERE slug = ?",
        )
        .bind(slug.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Group::try_from).transpose()?)
    }

    pub async fn count_posts(&self) -> Result<u64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    /// All posts, newest first, author and group resolved.
    pub async fn list_posts(&self, bounds: PageBounds) -> Result<Vec<Post>> {
        let sql = format!("{SELECT_POSTS} ORDER BY posts.id DESC LIMIT ? OFFSET ?");
        let records = query_as::<_, PostRecord>(&sql)
            .bind(bounds.limit())
            .bind(bounds.offset())
            .fetch_all(&self.pool)
            .await?;

        collect_posts(records)
    }

    pub async fn count_group_posts(&self, group_id: Id<GroupMarker>) -> Result<u64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE group_id = ?")
            .bind(group_id.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn list_group_posts(
        &self,
        group_id: Id<GroupMarker>,
        bounds: PageBounds,
    ) -> Result<Vec<Post>> {
        let sql = format!(
            "{SELECT_POSTS} WHERE posts.group_id = ? ORDER BY posts.id DESC LIMIT ? OFFSET ?"
        );
        let records = query_as::<_, PostRecord>(&sql)
            .bind(group_id.get())
            .bind(bounds.limit())
            .bind(bounds.offset())
            .fetch_all(&self.pool)
            .await?;

        collect_posts(records)
    }

    pub async fn count_author_posts(&self, author_id: Id<UserMarker>) -> Result<u64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE author_id = ?")
            .bind(author_id.get())
            .fetch_one(&self.pool)
            .await?;

        Ok(count.cast_unsigned())
    }

    pub async fn list_author_posts(
        &self,
        author_id: Id<UserMarker>,
        bounds: PageBounds,
    ) -> Result<Vec<Post>> {
        let sql = format!(
            "{SELECT_POSTS} WHERE posts.author_id = ? ORDER BY posts.id DESC LIMIT ? OFFSET ?"
        );
        let records = query_as::<_, PostRecord>(&sql)
            .bind(author_id.get())
            .bind(bounds.limit())
            .bind(bounds.offset())
            .fetch_all(&self.pool)
            .await?;

        collect_posts(records)
    }

    pub async fn count_followed_posts(&self, user_id: Id<UserMarker>) -> Result<u64> {
        let count = query_scalar::<_, i64>(
            "
            SELECT COUNT(*) FROM posts
            WHERE author_id IN (SELECT author_id FROM follows WHERE user_id = ?)
            ",
        )
        .bind(user_id.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.cast_unsigned())
    }

    /// Posts by every author the user follows, newest first.
    pub async fn list_followed_posts(
        &self,
        user_id: Id<UserMarker>,
        bounds: PageBounds,
    ) -> Result<Vec<Post>> {
        let sql = format!(
            "{SELECT_POSTS}
            WHERE posts.author_id IN (SELECT author_id FROM follows WHERE user_id = ?)
            ORDER BY posts.id DESC LIMIT ? OFFSET ?"
        );
        let records = query_as::<_, PostRecord>(&sql)
            .bind(user_id.get())
            .bind(bounds.limit())
            .bind(bounds.offset())
            .fetch_all(&self.pool)
            .await?;

        collect_posts(records)
    }

    pub async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let sql = format!("{SELECT_POSTS} WHERE posts.id = ?");
        let record = query_as::<_, PostRecord>(&sql)
            .bind(post_id.get())
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Post::try_from).transpose()?)
    }

    /// Fetch a post only if `author_id` wrote it. The edit flow uses this so
    /// that someone else's post is indistinguishable from a missing one.
    pub async fn fetch_post_by_author(
        &self,
        post_id: Id<PostMarker>,
        author_id: Id<UserMarker>,
    ) -> Result<Option<Post>> {
        let sql = format!("{SELECT_POSTS} WHERE posts.id = ? AND posts.author_id = ?");
        let record = query_as::<_, PostRecord>(&sql)
            .bind(post_id.get())
            .bind(author_id.get())
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(Post::try_from).transpose()?)
    }

    pub async fn create_post(
        &self,
        author_id: Id<UserMarker>,
        text: &PostText,
        group_id: Option<Id<GroupMarker>>,
        image: Option<&str>,
    ) -> Result<Id<PostMarker>> {
        let id = query_scalar::<_, i64>(
            "
            INSERT INTO posts (text, author_id, group_id, image, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            ",
        )
        .bind(text.get())
        .bind(author_id.get())
        .bind(group_id.map(Id::get))
        .bind(image)
        .bind(now())
        .fetch_one(&self.pool)
        .await?;

        Ok(id.into())
    }

    /// Change a post's mutable fields. Returns false when no row matched,
    /// which covers both a missing post and an author mismatch.
    pub async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        author_id: Id<UserMarker>,
        text: &PostText,
        group_id: Option<Id<GroupMarker>>,
        image: Option<&str>,
    ) -> Result<bool> {
        let result = query(
            "
            UPDATE posts SET text = ?, group_id = ?, image = ?
            WHERE id = ? AND author_id = ?
            ",
        )
        .bind(text.get())
        .bind(group_id.map(Id::get))
        .bind(image)
        .bind(post_id.get())
        .bind(author_id.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn create_comment(
        &self,
        post_id: Id<PostMarker>,
        author_id: Id<UserMarker>,
        text: &CommentText,
    ) -> Result<Id<CommentMarker>> {
        let id = query_scalar::<_, i64>(
            "
            INSERT INTO comments (text, author_id, post_id, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            ",
        )
        .bind(text.get())
        .bind(author_id.get())
        .bind(post_id.get())
        .bind(now())
        .fetch_one(&self.pool)
        .await?;

        Ok(id.into())
    }

    /// A post's comments, oldest first.
    pub async fn list_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comments.id, comments.text, comments.created_at, comments.post_id,
                users.id AS author_id, users.username AS author_username
            FROM comments
            JOIN users ON users.id = comments.author_id
            WHERE comments.post_id = ?
            ORDER BY comments.id
            ",
        )
        .bind(post_id.get())
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|record| Comment::try_from(record).map_err(DbError::from))
            .collect()
    }

    /// Create a follow edge. Idempotent; following yourself is a no-op.
    pub async fn follow(&self, user_id: Id<UserMarker>, author_id: Id<UserMarker>) -> Result<()> {
        if user_id == author_id {
            return Ok(());
        }

        query(
            "
            INSERT INTO follows (user_id, author_id) VALUES (?, ?)
            ON CONFLICT (user_id, author_id) DO NOTHING
            ",
        )
        .bind(user_id.get())
        .bind(author_id.get())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a follow edge. Returns false when there was none to delete.
    pub async fn unfollow(
        &self,
        user_id: Id<UserMarker>,
        author_id: Id<UserMarker>,
    ) -> Result<bool> {
        let result = query("DELETE FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user_id.get())
            .bind(author_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(
        &self,
        user_id: Id<UserMarker>,
        author_id: Id<UserMarker>,
    ) -> Result<bool> {
        let count = query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM follows WHERE user_id = ? AND author_id = ?",
        )
        .bind(user_id.get())
        .bind(author_id.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

fn collect_posts(records: Vec<PostRecord>) -> Result<Vec<Post>> {
    records
        .into_iter()
        .map(|record| Post::try_from(record).map_err(DbError::from))
        .collect()
}

fn unique_violation_or_other(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::UniqueViolation,
        other => other.into(),
    }
}

fn as_primitive(date_time: UtcDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(date_time.date(), date_time.time())
}

fn now() -> PrimitiveDateTime {
    as_primitive(UtcDateTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribuna_common::pagination::{PAGE_SIZE, PageBounds};

    async fn client() -> DbClient {
        DbClient::connect("sqlite::memory:").await.unwrap()
    }

    async fn user(client: &DbClient, name: &str) -> Id<UserMarker> {
        client
            .create_user(&Username::new(name.to_owned()).unwrap(), "hash")
            .await
            .unwrap()
    }

    async fn post(client: &DbClient, author: Id<UserMarker>, text: &str) -> Id<PostMarker> {
        client
            .create_post(author, &PostText::new(text.to_owned()).unwrap(), None, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let client = client().await;
        user(&client, "anna").await;

        let duplicate = client
            .create_user(&Username::new("anna".to_owned()).unwrap(), "other-hash")
            .await;

        assert!(matches!(duplicate, Err(DbError::UniqueViolation)));
    }

    #[tokio::test]
    async fn follow_twice_leaves_one_edge() {
        let client = client().await;
        let anna = user(&client, "anna").await;
        let boris = user(&client, "boris").await;

        client.follow(anna, boris).await.unwrap();
        client.follow(anna, boris).await.unwrap();

        assert!(client.is_following(anna, boris).await.unwrap());
        assert!(client.unfollow(anna, boris).await.unwrap());
        // The second follow must not have created a second edge.
        assert!(!client.unfollow(anna, boris).await.unwrap());
    }

    #[tokio::test]
    async fn self_follow_creates_no_edge() {
        let client = client().await;
        let anna = user(&client, "anna").await;

        client.follow(anna, anna).await.unwrap();

        assert!(!client.is_following(anna, anna).await.unwrap());
    }

    #[tokio::test]
    async fn unfollow_without_edge_reports_missing() {
        let client = client().await;
        let anna = user(&client, "anna").await;
        let boris = user(&client, "boris").await;

        assert!(!client.unfollow(anna, boris).await.unwrap());
    }

    #[tokio::test]
    async fn listings_are_newest_first() {
        let client = client().await;
        let anna = user(&client, "anna").await;
        let first = post(&client, anna, "first").await;
        let second = post(&client, anna, "second").await;

        let bounds = PageBounds::new(None, client.count_posts().await.unwrap()).unwrap();
        let posts = client.list_posts(bounds).await.unwrap();

        assert_eq!(
            posts.iter().map(|post| post.id).collect::<Vec<_>>(),
            vec![second, first]
        );
    }

    #[tokio::test]
    async fn group_listings_are_isolated() {
        let client = client().await;
        let anna = user(&client, "anna").await;
        let cooking = client
            .create_group("Cooking", &Slug::new("cooking".to_owned()).unwrap(), "")
            .await
            .unwrap();
        let hiking = client
            .create_group("Hiking", &Slug::new("hiking".to_owned()).unwrap(), "")
            .await
            .unwrap();

        client
            .create_post(
                anna,
                &PostText::new("borscht".to_owned()).unwrap(),
                Some(cooking),
                None,
            )
            .await
            .unwrap();

        let bounds = PageBounds::new(None, 1).unwrap();
        assert_eq!(client.list_group_posts(cooking, bounds).await.unwrap().len(), 1);
        assert_eq!(client.count_group_posts(hiking).await.unwrap(), 0);
        assert!(client.list_group_posts(hiking, bounds).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn followed_feed_only_contains_followed_authors() {
        let client = client().await;
        let anna = user(&client, "anna").await;
        let boris = user(&client, "boris").await;
        let clara = user(&client, "clara").await;

        post(&client, boris, "from boris").await;
        post(&client, clara, "from clara").await;
        client.follow(anna, boris).await.unwrap();

        let total = client.count_followed_posts(anna).await.unwrap();
        assert_eq!(total, 1);

        let posts = client
            .list_followed_posts(anna, PageBounds::new(None, total).unwrap())
            .await
            .unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author.id, boris);
    }

    #[tokio::test]
    async fn page_slicing_matches_bounds() {
        let client = client().await;
        let anna = user(&client, "anna").await;
        for n in 0..13 {
            post(&client, anna, &format!("post {n}")).await;
        }

        let total = client.count_posts().await.unwrap();
        let first = client
            .list_posts(PageBounds::new(Some(1), total).unwrap())
            .await
            .unwrap();
        let second = client
            .list_posts(PageBounds::new(Some(2), total).unwrap())
            .await
            .unwrap();

        assert_eq!(first.len(), PAGE_SIZE as usize);
        assert_eq!(second.len(), 3);
        assert!(PageBounds::new(Some(3), total).is_err());
    }

    #[tokio::test]
    async fn author_mismatch_masks_the_post() {
        let client = client().await;
        let anna = user(&client, "anna").await;
        let boris = user(&client, "boris").await;
        let post_id = post(&client, anna, "mine").await;

        assert!(client
            .fetch_post_by_author(post_id, anna)
            .await
            .unwrap()
            .is_some());
        assert!(client
            .fetch_post_by_author(post_id, boris)
            .await
            .unwrap()
            .is_none());

        let text = PostText::new("stolen".to_owned()).unwrap();
        assert!(!client.update_post(post_id, boris, &text, None, None).await.unwrap());
    }

    #[tokio::test]
    async fn comments_attach_to_their_post_in_order() {
        let client = client().await;
        let anna = user(&client, "anna").await;
        let post_id = post(&client, anna, "commented").await;
        let other_post = post(&client, anna, "quiet").await;

        for text in ["first!", "second"] {
            client
                .create_comment(post_id, anna, &CommentText::new(text.to_owned()).unwrap())
                .await
                .unwrap();
        }

        let comments = client.list_post_comments(post_id).await.unwrap();
        assert_eq!(
            comments
                .iter()
                .map(|comment| comment.text.get())
                .collect::<Vec<_>>(),
            vec!["first!", "second"]
        );
        assert!(client.list_post_comments(other_post).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sessions_round_trip() {
        use tribuna_common::model::auth::AuthToken;

        let client = client().await;
        let anna = user(&client, "anna").await;
        let token = AuthToken::generate_random(anna);
        let token_hash = token.hash().unwrap();

        let authentication = Authentication {
            user: anna,
            token_hash: token_hash.clone(),
            created_at: UtcDateTime::now(),
            expires_after: None,
        };
        client.create_session(&authentication).await.unwrap();

        let fetched = client.fetch_session(&token_hash).await.unwrap().unwrap();
        assert_eq!(fetched.user, anna);
        assert_eq!(fetched.token_hash, token_hash);
    }
}
