#![cfg(feature = "inmem-store")]

use actix_web::cookie::Cookie;
use actix_web::{test, web, App};
use scribe::auth::{JwtKeys, ACCESS_TOKEN_COOKIE};
use scribe::models::{NewComment, NewUser, User};
use scribe::repo::inmem::InMemRepo;
use scribe::repo::{CommentRepo, UserRepo, MAX_THREAD_DEPTH};
use scribe::{config, AppState};
use serde_json::{json, Value};
use std::sync::Arc;

const SECRET: &[u8] = b"test-secret-must-be-32-bytes-long!!";

fn keys() -> Arc<JwtKeys> {
    Arc::new(JwtKeys::new(SECRET, chrono::Duration::hours(1)))
}

fn state(repo: &InMemRepo) -> web::Data<AppState> {
    web::Data::new(AppState { repo: Arc::new(repo.clone()), jwt: keys(), secure_cookies: false })
}

async fn seed_user(repo: &InMemRepo, name: &str) -> User {
    repo.create_user(NewUser {
        username: name.into(),
        email: format!("{name}@example.com"),
        img: Some(format!("{name}.png")),
        password_hash: "unused".into(),
    })
    .await
    .unwrap()
}

fn session(user: &User) -> Cookie<'static> {
    Cookie::new(ACCESS_TOKEN_COOKIE, keys().issue(user).unwrap())
}

macro_rules! json_body {
    ($resp:expr) => {
        serde_json::from_slice::<Value>(&test::read_body($resp).await).unwrap()
    };
}

#[actix_web::test]
async fn post_crud_flow() {
    let repo = InMemRepo::new();
    let alice = seed_user(&repo, "alice").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    // list posts empty
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(json_body!(resp).as_array().unwrap().len(), 0);

    // create post
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(session(&alice))
        .set_json(json!({"title": "Hello", "desc": "<p>first</p>", "img": "cover.png", "cat": "tech"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post = json_body!(resp);
    let post_id = post["id"].as_i64().unwrap();
    assert_eq!(post["uid"], alice.id);
    assert_eq!(post["desc"], "<p>first</p>");

    // single post is joined with its author
    let req = test::TestRequest::get().uri(&format!("/api/posts/{post_id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let detail = json_body!(resp);
    assert_eq!(detail["username"], "alice");
    assert_eq!(detail["userImg"], "alice.png");
    assert_eq!(detail["title"], "Hello");

    // update
    let req = test::TestRequest::put()
        .uri(&format!("/api/posts/{post_id}"))
        .cookie(session(&alice))
        .set_json(json!({"title": "Hello again", "desc": "edited", "img": null, "cat": "art"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let upd = json_body!(resp);
    assert_eq!(upd["title"], "Hello again");
    assert_eq!(upd["cat"], "art");
    assert!(upd["img"].is_null());

    // delete
    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{post_id}"))
        .cookie(session(&alice))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/posts/{post_id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn list_posts_filters_by_category() {
    let repo = InMemRepo::new();
    let alice = seed_user(&repo, "alice").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    for (title, cat) in [("a", "tech"), ("b", "food"), ("c", "tech")] {
        let req = test::TestRequest::post()
            .uri("/api/posts")
            .cookie(session(&alice))
            .set_json(json!({"title": title, "desc": "x", "img": null, "cat": cat}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get().uri("/api/posts?cat=tech").to_request();
    let tech = json_body!(test::call_service(&app, req).await);
    let titles: Vec<_> = tech.as_array().unwrap().iter().map(|p| p["title"].as_str().unwrap().to_string()).collect();
    assert_eq!(titles, vec!["a", "c"]);

    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let all = json_body!(test::call_service(&app, req).await);
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[actix_web::test]
async fn writes_require_a_valid_cookie() {
    let repo = InMemRepo::new();
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;
    let body = json!({"title": "t", "desc": "d", "img": null, "cat": "c"});

    // no cookie
    let req = test::TestRequest::post().uri("/api/posts").set_json(&body).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(json_body!(resp)["error"], "not authenticated");

    // garbage token
    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "not-a-jwt"))
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(json_body!(resp)["error"], "token is not valid");

    // token signed with another secret
    let foreign = JwtKeys::new(b"another-secret-that-is-also-32-bytes!", chrono::Duration::hours(1));
    let someone = User { id: 1, username: "x".into(), email: "x@example.com".into(), img: None };
    let req = test::TestRequest::delete()
        .uri("/api/posts/1")
        .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, foreign.issue(&someone).unwrap()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}

#[actix_web::test]
async fn only_the_owner_may_modify_a_post() {
    let repo = InMemRepo::new();
    let alice = seed_user(&repo, "alice").await;
    let mallory = seed_user(&repo, "mallory").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(session(&alice))
        .set_json(json!({"title": "mine", "desc": "d", "img": null, "cat": "c"}))
        .to_request();
    let post_id = json_body!(test::call_service(&app, req).await)["id"].as_i64().unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/posts/{post_id}"))
        .cookie(session(&mallory))
        .set_json(json!({"title": "pwned", "desc": "d", "img": null, "cat": "c"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(json_body!(resp)["error"], "you can only modify your own resource");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{post_id}"))
        .cookie(session(&mallory))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    // row untouched
    let req = test::TestRequest::get().uri(&format!("/api/posts/{post_id}")).to_request();
    let detail = json_body!(test::call_service(&app, req).await);
    assert_eq!(detail["title"], "mine");

    // missing rows are not-found rather than forbidden
    let req = test::TestRequest::delete()
        .uri("/api/posts/9999")
        .cookie(session(&mallory))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn comments_come_back_as_a_reply_tree() {
    let repo = InMemRepo::new();
    let alice = seed_user(&repo, "alice").await;
    let bob = seed_user(&repo, "bob").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(session(&alice))
        .set_json(json!({"title": "t", "desc": "d", "img": null, "cat": "c"}))
        .to_request();
    let post_id = json_body!(test::call_service(&app, req).await)["id"].as_i64().unwrap();
    let comments_uri = format!("/api/posts/{post_id}/comments");

    // root comment
    let req = test::TestRequest::post()
        .uri(&comments_uri)
        .cookie(session(&bob))
        .set_json(json!({"text": "first!"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let root = json_body!(resp);
    assert_eq!(root["username"], "bob");
    assert!(root["parent_comment_id"].is_null());
    let root_id = root["id"].as_i64().unwrap();

    // reply, then reply to the reply
    let req = test::TestRequest::post()
        .uri(&comments_uri)
        .cookie(session(&alice))
        .set_json(json!({"text": "thanks", "parent_comment_id": root_id}))
        .to_request();
    let reply_id = json_body!(test::call_service(&app, req).await)["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&comments_uri)
        .cookie(session(&bob))
        .set_json(json!({"text": "np", "parent_comment_id": reply_id}))
        .to_request();
    let nested_id = json_body!(test::call_service(&app, req).await)["id"].as_i64().unwrap();

    let req = test::TestRequest::get().uri(&comments_uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let tree = json_body!(resp);
    let roots = tree.as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["id"], root_id);
    assert_eq!(roots[0]["replies"][0]["id"], reply_id);
    assert_eq!(roots[0]["replies"][0]["replies"][0]["id"], nested_id);
    assert_eq!(roots[0]["replies"][0]["replies"][0]["replies"], json!([]));

    // blank text rejected
    let req = test::TestRequest::post()
        .uri(&comments_uri)
        .cookie(session(&bob))
        .set_json(json!({"text": "   "}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
async fn deleting_comments_respects_ownership() {
    let repo = InMemRepo::new();
    let alice = seed_user(&repo, "alice").await;
    let bob = seed_user(&repo, "bob").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(session(&alice))
        .set_json(json!({"title": "t", "desc": "d", "img": null, "cat": "c"}))
        .to_request();
    let post_id = json_body!(test::call_service(&app, req).await)["id"].as_i64().unwrap();
    let comments_uri = format!("/api/posts/{post_id}/comments");

    let req = test::TestRequest::post()
        .uri(&comments_uri)
        .cookie(session(&bob))
        .set_json(json!({"text": "bob was here"}))
        .to_request();
    let comment_id = json_body!(test::call_service(&app, req).await)["id"].as_i64().unwrap();
    let comment_uri = format!("{comments_uri}/{comment_id}");

    // alice owns the post but not the comment
    let req = test::TestRequest::delete().uri(&comment_uri).cookie(session(&alice)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(json_body!(resp)["error"], "you can only modify your own resource");

    // comment untouched
    let req = test::TestRequest::get().uri(&comments_uri).to_request();
    let tree = json_body!(test::call_service(&app, req).await);
    assert_eq!(tree.as_array().unwrap().len(), 1);
    assert_eq!(tree[0]["id"], comment_id);
    assert_eq!(tree[0]["text"], "bob was here");
    assert_eq!(tree[0]["username"], "bob");

    let req = test::TestRequest::delete().uri(&comment_uri).cookie(session(&bob)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    let req = test::TestRequest::delete().uri(&comment_uri).cookie(session(&bob)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri(&comments_uri).to_request();
    assert_eq!(json_body!(test::call_service(&app, req).await), json!([]));
}

#[actix_web::test]
async fn commenting_on_missing_post_is_not_found() {
    let repo = InMemRepo::new();
    let bob = seed_user(&repo, "bob").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/posts/404/comments")
        .cookie(session(&bob))
        .set_json(json!({"text": "hello?"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn updating_missing_post_is_not_found() {
    let repo = InMemRepo::new();
    let alice = seed_user(&repo, "alice").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    let req = test::TestRequest::put()
        .uri("/api/posts/9999")
        .cookie(session(&alice))
        .set_json(json!({"title": "t", "desc": "d", "img": null, "cat": "c"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(json_body!(resp)["error"], "not found");
}

#[actix_web::test]
async fn reply_to_missing_parent_is_not_found() {
    let repo = InMemRepo::new();
    let bob = seed_user(&repo, "bob").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(session(&bob))
        .set_json(json!({"title": "t", "desc": "d", "img": null, "cat": "c"}))
        .to_request();
    let post_id = json_body!(test::call_service(&app, req).await)["id"].as_i64().unwrap();
    let comments_uri = format!("/api/posts/{post_id}/comments");

    let req = test::TestRequest::post()
        .uri(&comments_uri)
        .cookie(session(&bob))
        .set_json(json!({"text": "replying to nothing", "parent_comment_id": 4242}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri(&comments_uri).to_request();
    assert_eq!(json_body!(test::call_service(&app, req).await), json!([]));
}

#[actix_web::test]
async fn reply_chains_stop_at_the_depth_cap() {
    let repo = InMemRepo::new();
    let bob = seed_user(&repo, "bob").await;
    let app = test::init_service(App::new().app_data(state(&repo)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .cookie(session(&bob))
        .set_json(json!({"title": "t", "desc": "d", "img": null, "cat": "c"}))
        .to_request();
    let post_id = json_body!(test::call_service(&app, req).await)["id"].as_i64().unwrap();
    let comments_uri = format!("/api/posts/{post_id}/comments");

    // bob keeps replying to his own last reply
    let mut parent = None;
    for level in 1..=MAX_THREAD_DEPTH {
        let c = repo
            .create_comment(post_id, bob.id, NewComment { text: format!("level {level}"), parent_comment_id: parent })
            .await
            .unwrap();
        parent = Some(c.id);
    }

    let req = test::TestRequest::post()
        .uri(&comments_uri)
        .cookie(session(&bob))
        .set_json(json!({"text": "deeper", "parent_comment_id": parent}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert!(json_body!(resp)["error"].as_str().unwrap().contains("levels deep"));

    // the capped chain still lists as one nested thread
    let req = test::TestRequest::get().uri(&comments_uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let tree = json_body!(resp);
    assert_eq!(tree.as_array().unwrap().len(), 1);
    let mut levels = 1;
    let mut cur = &tree[0];
    while let Some(next) = cur["replies"].as_array().and_then(|r| r.first()) {
        levels += 1;
        cur = next;
    }
    assert_eq!(levels, MAX_THREAD_DEPTH);
}
