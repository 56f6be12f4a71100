use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("not owner")] NotOwner,
    #[error("conflict")] Conflict,
    #[error("reply nesting too deep")] TooDeep,
    #[error("store failure: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Deepest reply nesting a write may create, root comment counted as level 1.
pub const MAX_THREAD_DEPTH: usize = 32;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_credentials(&self, username: &str) -> RepoResult<Option<UserCredentials>>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// `cat = Some(..)` selects the category-filtered query.
    async fn list_posts(&self, cat: Option<&str>) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Id) -> RepoResult<PostDetail>;
    async fn create_post(&self, uid: Id, new: NewPost) -> RepoResult<Post>;
    async fn update_post(&self, id: Id, uid: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn delete_post(&self, id: Id, uid: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Newest first; ties broken by id, newest first.
    async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>>;
    async fn create_comment(&self, post_id: Id, uid: Id, new: NewComment) -> RepoResult<Comment>;
    async fn delete_comment(&self, post_id: Id, comment_id: Id, uid: Id) -> RepoResult<()>;
}

pub trait Repo: UserRepo + PostRepo + CommentRepo {}

impl<T> Repo for T where T: UserRepo + PostRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::Utc;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    struct StoredComment {
        id: Id,
        post_id: Id,
        uid: Id,
        text: String,
        date: chrono::DateTime<Utc>,
        parent_comment_id: Option<Id>,
    }

    #[derive(Default)]
    struct State {
        users: BTreeMap<Id, UserCredentials>,
        posts: BTreeMap<Id, Post>,
        comments: BTreeMap<Id, StoredComment>,
        next_id: Id,
    }

    impl State {
        fn next_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn join_comment(&self, c: &StoredComment) -> RepoResult<Comment> {
            let author = self.users.get(&c.uid).ok_or(RepoError::NotFound)?;
            Ok(Comment {
                id: c.id,
                post_id: c.post_id,
                uid: c.uid,
                username: author.username.clone(),
                text: c.text.clone(),
                date: c.date,
                parent_comment_id: c.parent_comment_id,
            })
        }

        /// Nesting level of an existing comment (root = 1), capped just past
        /// `MAX_THREAD_DEPTH`; `None` when the comment does not exist.
        fn thread_level(&self, id: Id) -> Option<usize> {
            let mut level = 1;
            let mut cur = self.comments.get(&id)?;
            while let Some(parent) = cur.parent_comment_id {
                match self.comments.get(&parent) {
                    Some(p) if level <= MAX_THREAD_DEPTH => {
                        level += 1;
                        cur = p;
                    }
                    _ => break,
                }
            }
            Some(level)
        }

        // mirrors ON DELETE CASCADE on comments.parent_comment_id
        fn remove_comment_subtree(&mut self, root: Id) {
            let mut doomed: HashSet<Id> = HashSet::from([root]);
            loop {
                let before = doomed.len();
                for c in self.comments.values() {
                    if c.parent_comment_id.is_some_and(|p| doomed.contains(&p)) {
                        doomed.insert(c.id);
                    }
                }
                if doomed.len() == before { break; }
            }
            self.comments.retain(|id, _| !doomed.contains(id));
        }
    }

    /// Process-local store for tests and local development.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.values().any(|u| u.username == new.username || u.email == new.email) {
                return Err(RepoError::Conflict);
            }
            let id = s.next_id();
            let creds = UserCredentials {
                id,
                username: new.username,
                email: new.email,
                img: new.img,
                password_hash: new.password_hash,
            };
            s.users.insert(id, creds.clone());
            Ok(creds.into())
        }

        async fn find_credentials(&self, username: &str) -> RepoResult<Option<UserCredentials>> {
            let s = self.read()?;
            Ok(s.users.values().find(|u| u.username == username).cloned())
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.read()?;
            s.users.get(&id).cloned().map(User::from).ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self, cat: Option<&str>) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let posts = match cat {
                Some(cat) => s.posts.values().filter(|p| p.cat == cat).cloned().collect(),
                None => s.posts.values().cloned().collect(),
            };
            Ok(posts)
        }

        async fn get_post(&self, id: Id) -> RepoResult<PostDetail> {
            let s = self.read()?;
            let post = s.posts.get(&id).ok_or(RepoError::NotFound)?;
            let author = s.users.get(&post.uid).ok_or(RepoError::NotFound)?;
            Ok(PostDetail {
                id: post.id,
                username: author.username.clone(),
                title: post.title.clone(),
                description: post.description.clone(),
                img: post.img.clone(),
                user_img: author.img.clone(),
                cat: post.cat.clone(),
                date: post.date,
            })
        }

        async fn create_post(&self, uid: Id, new: NewPost) -> RepoResult<Post> {
            let mut s = self.write()?;
            if !s.users.contains_key(&uid) { return Err(RepoError::NotFound); }
            let id = s.next_id();
            let post = Post {
                id,
                title: new.title,
                description: new.description,
                img: new.img,
                cat: new.cat,
                date: new.date.unwrap_or_else(Utc::now),
                uid,
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        }

        async fn update_post(&self, id: Id, uid: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.write()?;
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            if post.uid != uid { return Err(RepoError::NotOwner); }
            post.title = upd.title;
            post.description = upd.description;
            post.img = upd.img;
            post.cat = upd.cat;
            Ok(post.clone())
        }

        async fn delete_post(&self, id: Id, uid: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            let owner = s.posts.get(&id).map(|p| p.uid).ok_or(RepoError::NotFound)?;
            if owner != uid { return Err(RepoError::NotOwner); }
            s.posts.remove(&id);
            s.comments.retain(|_, c| c.post_id != id);
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            let mut v = s.comments
                .values()
                .filter(|c| c.post_id == post_id)
                .map(|c| s.join_comment(c))
                .collect::<RepoResult<Vec<_>>>()?;
            v.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
            Ok(v)
        }

        async fn create_comment(&self, post_id: Id, uid: Id, new: NewComment) -> RepoResult<Comment> {
            let id = {
                let mut s = self.write()?;
                if !s.posts.contains_key(&post_id) || !s.users.contains_key(&uid) {
                    return Err(RepoError::NotFound);
                }
                if let Some(parent) = new.parent_comment_id {
                    // mirrors the parent_comment_id foreign key
                    if s.thread_level(parent).ok_or(RepoError::NotFound)? >= MAX_THREAD_DEPTH {
                        return Err(RepoError::TooDeep);
                    }
                }
                let id = s.next_id();
                s.comments.insert(id, StoredComment {
                    id,
                    post_id,
                    uid,
                    text: new.text,
                    date: Utc::now(),
                    parent_comment_id: new.parent_comment_id,
                });
                id
            };
            // separate re-fetch, same as the Postgres backend
            let s = self.read()?;
            let stored = s.comments.get(&id).ok_or(RepoError::NotFound)?;
            s.join_comment(stored)
        }

        async fn delete_comment(&self, post_id: Id, comment_id: Id, uid: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            let owner = s.comments
                .get(&comment_id)
                .filter(|c| c.post_id == post_id)
                .map(|c| c.uid)
                .ok_or(RepoError::NotFound)?;
            if owner != uid { return Err(RepoError::NotOwner); }
            s.remove_comment_subtree(comment_id);
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    impl From<sqlx::Error> for RepoError {
        fn from(e: sqlx::Error) -> Self {
            match &e {
                sqlx::Error::RowNotFound => RepoError::NotFound,
                sqlx::Error::Database(db) => match db.code().as_deref() {
                    Some("23503") => RepoError::NotFound, // foreign_key_violation
                    Some("23505") => RepoError::Conflict, // unique_violation
                    _ => RepoError::Internal(e.to_string()),
                },
                _ => RepoError::Internal(e.to_string()),
            }
        }
    }

    const POST_COLUMNS: &str = "id, title, description, img, cat, date, uid";

    const COMMENT_SELECT: &str = r#"
        SELECT c.id, c.post_id, c.user_id AS uid, u.username, c.text, c.date, c.parent_comment_id
        FROM comments c
        JOIN users u ON c.user_id = u.id
    "#;

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Owner of a row, or `NotFound` when the row does not exist.
        async fn owner_of(&self, sql: &str, id: Id) -> RepoResult<Id> {
            let owner = sqlx::query_scalar::<_, Id>(sql)
                .bind(id)
                .fetch_optional(&self.pool).await?
                .ok_or(RepoError::NotFound)?;
            Ok(owner)
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let user = sqlx::query_as::<_, User>(
                "INSERT INTO users (username, email, img, password_hash) VALUES ($1,$2,$3,$4) RETURNING id, username, email, img"
            )
            .bind(&new.username)
            .bind(&new.email)
            .bind(new.img.as_ref())
            .bind(&new.password_hash)
            .fetch_one(&self.pool).await?;
            Ok(user)
        }

        async fn find_credentials(&self, username: &str) -> RepoResult<Option<UserCredentials>> {
            let creds = sqlx::query_as::<_, UserCredentials>(
                "SELECT id, username, email, img, password_hash FROM users WHERE username = $1"
            )
            .bind(username)
            .fetch_optional(&self.pool).await?;
            Ok(creds)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let user = sqlx::query_as::<_, User>("SELECT id, username, email, img FROM users WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool).await?;
            Ok(user)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn list_posts(&self, cat: Option<&str>) -> RepoResult<Vec<Post>> {
            let recs = match cat {
                Some(cat) => {
                    sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts WHERE cat = $1 ORDER BY id"))
                        .bind(cat)
                        .fetch_all(&self.pool).await?
                }
                None => {
                    sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts ORDER BY id"))
                        .fetch_all(&self.pool).await?
                }
            };
            Ok(recs)
        }

        async fn get_post(&self, id: Id) -> RepoResult<PostDetail> {
            let rec = sqlx::query_as::<_, PostDetail>(r#"
                SELECT p.id, u.username, p.title, p.description, p.img, u.img AS user_img, p.cat, p.date
                FROM users u
                JOIN posts p ON u.id = p.uid
                WHERE p.id = $1
            "#)
            .bind(id)
            .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn create_post(&self, uid: Id, new: NewPost) -> RepoResult<Post> {
            let rec = sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (title, description, img, cat, date, uid) VALUES ($1,$2,$3,$4,COALESCE($5, now()),$6) RETURNING {POST_COLUMNS}"
            ))
            .bind(&new.title)
            .bind(&new.description)
            .bind(new.img.as_ref())
            .bind(&new.cat)
            .bind(new.date)
            .bind(uid)
            .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn update_post(&self, id: Id, uid: Id, upd: UpdatePost) -> RepoResult<Post> {
            let owner = self.owner_of("SELECT uid FROM posts WHERE id = $1", id).await?;
            if owner != uid { return Err(RepoError::NotOwner); }
            let rec = sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET title = $1, description = $2, img = $3, cat = $4 WHERE id = $5 AND uid = $6 RETURNING {POST_COLUMNS}"
            ))
            .bind(&upd.title)
            .bind(&upd.description)
            .bind(upd.img.as_ref())
            .bind(&upd.cat)
            .bind(id)
            .bind(uid)
            .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn delete_post(&self, id: Id, uid: Id) -> RepoResult<()> {
            let owner = self.owner_of("SELECT uid FROM posts WHERE id = $1", id).await?;
            if owner != uid { return Err(RepoError::NotOwner); }
            let done = sqlx::query("DELETE FROM posts WHERE id = $1 AND uid = $2")
                .bind(id)
                .bind(uid)
                .execute(&self.pool).await?;
            if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn list_comments(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let recs = sqlx::query_as::<_, Comment>(&format!(
                "{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.date DESC, c.id DESC"
            ))
            .bind(post_id)
            .fetch_all(&self.pool).await?;
            Ok(recs)
        }

        async fn create_comment(&self, post_id: Id, uid: Id, new: NewComment) -> RepoResult<Comment> {
            if let Some(parent) = new.parent_comment_id {
                // walk up from the parent, stopping once past the cap
                let level = sqlx::query_scalar::<_, Option<i32>>(r#"
                    WITH RECURSIVE chain (id, parent_comment_id, level) AS (
                        SELECT id, parent_comment_id, 1 FROM comments WHERE id = $1
                        UNION ALL
                        SELECT c.id, c.parent_comment_id, chain.level + 1
                        FROM comments c
                        JOIN chain ON c.id = chain.parent_comment_id
                        WHERE chain.level <= $2
                    )
                    SELECT MAX(level) FROM chain
                "#)
                .bind(parent)
                .bind(MAX_THREAD_DEPTH as i32)
                .fetch_one(&self.pool).await?
                .ok_or(RepoError::NotFound)?;
                if level as usize >= MAX_THREAD_DEPTH { return Err(RepoError::TooDeep); }
            }
            let id = sqlx::query_scalar::<_, Id>(
                "INSERT INTO comments (text, post_id, user_id, parent_comment_id) VALUES ($1,$2,$3,$4) RETURNING id"
            )
            .bind(&new.text)
            .bind(post_id)
            .bind(uid)
            .bind(new.parent_comment_id)
            .fetch_one(&self.pool).await?;
            // Re-select joined with the author
            let rec = sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1"))
                .bind(id)
                .fetch_one(&self.pool).await?;
            Ok(rec)
        }

        async fn delete_comment(&self, post_id: Id, comment_id: Id, uid: Id) -> RepoResult<()> {
            let owner = sqlx::query_scalar::<_, Id>("SELECT user_id FROM comments WHERE id = $1 AND post_id = $2")
                .bind(comment_id)
                .bind(post_id)
                .fetch_optional(&self.pool).await?
                .ok_or(RepoError::NotFound)?;
            if owner != uid { return Err(RepoError::NotOwner); }
            let done = sqlx::query("DELETE FROM comments WHERE id = $1 AND user_id = $2")
                .bind(comment_id)
                .bind(uid)
                .execute(&self.pool).await?;
            if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }
    }
}
