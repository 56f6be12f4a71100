use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Postgres BIGSERIAL keys
pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub img: Option<String>,
}

/// Login lookup row; never serialized to clients.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub img: Option<String>,
    pub password_hash: String,
}

impl From<UserCredentials> for User {
    fn from(c: UserCredentials) -> Self {
        User { id: c.id, username: c.username, email: c.email, img: c.img }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub img: Option<String>,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    pub img: Option<String>,
    pub cat: String,
    pub date: DateTime<Utc>,
    pub uid: Id, // owning user
}

/// Single post joined with its author.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostDetail {
    pub id: Id,
    pub username: String,
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    pub img: Option<String>,
    #[serde(rename = "userImg")]
    pub user_img: Option<String>,
    pub cat: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    pub img: Option<String>,
    pub cat: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>, // server time when omitted
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    pub img: Option<String>,
    pub cat: String,
}

/// Flat comment row joined with its author's username.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub uid: Id,
    pub username: String,
    pub text: String,
    pub date: DateTime<Utc>,
    pub parent_comment_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub text: String,
    #[serde(default)]
    pub parent_comment_id: Option<Id>,
}
