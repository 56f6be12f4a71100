use std::sync::Arc;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{self, Auth, JwtKeys};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::Repo;
use crate::tree::build_comment_tree;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::put().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(
                web::resource("/posts/{id}/comments")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(create_comment)),
            )
            .service(
                web::resource("/posts/{id}/comments/{comment_id}")
                    .route(web::delete().to(delete_comment)),
            )
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me))),
    );
}

/// Shared per-app handles; built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub jwt: Arc<JwtKeys>,
    pub secure_cookies: bool,
}

fn require_non_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

// ---------------- Posts ---------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PostFilter {
    /// Only posts in this category
    pub cat: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/posts",
    tag = "posts",
    params(PostFilter),
    responses(
        (status = 200, description = "List posts", body = [Post])
    )
)]
pub async fn list_posts(data: web::Data<AppState>, query: web::Query<PostFilter>) -> Result<HttpResponse, ApiError> {
    let posts = data.repo.list_posts(query.cat.as_deref()).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    tag = "posts",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post joined with its author", body = PostDetail),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    tag = "posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Token is not valid")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    require_non_blank("title", &payload.title)?;
    let post = data.repo.create_post(auth.user_id(), payload.into_inner()).await?;
    tracing::info!(post_id = post.id, uid = post.uid, "post created");
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    tag = "posts",
    request_body = UpdatePost,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 403, description = "Not the owner, or token is not valid"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePost>,
) -> Result<HttpResponse, ApiError> {
    require_non_blank("title", &payload.title)?;
    let post = data.repo.update_post(path.into_inner(), auth.user_id(), payload.into_inner()).await?;
    tracing::info!(post_id = post.id, "post updated");
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    tag = "posts",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 403, description = "Not the owner, or token is not valid"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    data.repo.delete_post(id, auth.user_id()).await?;
    tracing::info!(post_id = id, "post deleted");
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Comments ------------------------------------------

#[utoipa::path(
    get,
    path = "/api/posts/{id}/comments",
    tag = "comments",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Reply tree, newest first", body = [crate::tree::CommentNode])
    )
)]
pub async fn list_comments(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let rows = data.repo.list_comments(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(build_comment_tree(rows)))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/comments",
    tag = "comments",
    request_body = NewComment,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Blank text, or reply nested too deep"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Post or parent comment not found")
    )
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    require_non_blank("text", &payload.text)?;
    let comment = data.repo.create_comment(path.into_inner(), auth.user_id(), payload.into_inner()).await?;
    tracing::info!(comment_id = comment.id, post_id = comment.post_id, "comment created");
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}/comments/{comment_id}",
    tag = "comments",
    params(
        ("id" = Id, Path, description = "Post id"),
        ("comment_id" = Id, Path, description = "Comment id")
    ),
    responses(
        (status = 204, description = "Comment and its replies deleted"),
        (status = 403, description = "Not the owner, or token is not valid"),
        (status = 404, description = "Comment not found")
    )
)]
pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (post_id, comment_id) = path.into_inner();
    data.repo.delete_comment(post_id, comment_id, auth.user_id()).await?;
    tracing::info!(post_id, comment_id, "comment deleted");
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Accounts ------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub img: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Missing fields"),
        (status = 409, description = "Username or email already taken")
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    require_non_blank("username", &req.username)?;
    require_non_blank("email", &req.email)?;
    require_non_blank("password", &req.password)?;

    let password_hash = auth::hash_password(&req.password).map_err(|e| {
        tracing::error!(error = %e, "password hashing failed");
        ApiError::Internal
    })?;
    let user = data.repo
        .create_user(NewUser { username: req.username, email: req.email, img: req.img, password_hash })
        .await?;
    tracing::info!(uid = user.id, username = %user.username, "user registered");
    Ok(HttpResponse::Created().json(user))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; access_token cookie set", body = User),
        (status = 400, description = "Wrong username or password")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let creds = data.repo
        .find_credentials(&payload.username).await?
        .ok_or(ApiError::InvalidCredentials)?;
    if !auth::verify_password(&payload.password, &creds.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }
    let user = User::from(creds);
    let token = data.jwt.issue(&user).map_err(|e| {
        tracing::error!(error = %e, "token signing failed");
        ApiError::Internal
    })?;
    tracing::info!(uid = user.id, "user logged in");
    Ok(HttpResponse::Ok()
        .cookie(auth::session_cookie(token, data.secure_cookies))
        .json(user))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "access_token cookie cleared", body = MessageResponse)
    )
)]
pub async fn logout(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .cookie(auth::removal_cookie(data.secure_cookies))
        .json(MessageResponse { message: "User has been logged out.".into() })
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Token is not valid")
    )
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(user))
}
