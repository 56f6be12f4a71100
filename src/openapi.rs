use crate::models::{Comment, NewComment, NewPost, Post, PostDetail, UpdatePost, User};
use crate::routes::{LoginRequest, MessageResponse, RegisterRequest};
use crate::tree::CommentNode;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_posts,
        crate::routes::get_post,
        crate::routes::create_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::list_comments,
        crate::routes::create_comment,
        crate::routes::delete_comment,
        crate::routes::register,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::auth_me,
    ),
    components(schemas(
        Post, PostDetail, NewPost, UpdatePost, Comment, NewComment, CommentNode,
        User, RegisterRequest, LoginRequest, MessageResponse
    )),
    tags(
        (name = "posts", description = "Post operations"),
        (name = "comments", description = "Threaded comments"),
        (name = "auth", description = "Accounts and session cookie"),
    )
)]
pub struct ApiDoc;
