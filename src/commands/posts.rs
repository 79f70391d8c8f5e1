use serde::Deserialize;
use uuid::Uuid;

use crate::commands::{notify, optional_text, require_id, require_text};
use crate::commands::users::get_user;
use crate::db::queries::{self, CommentRow, PostRow};
use crate::db::timestamp_now;
use crate::notify::NotificationEvent;
use crate::pagination::resources::{CommentsCursor, PostsCursor};
use crate::pagination::{assemble, Filter, Page, PageRequest};
use crate::{AppError, AppState};

const TITLE_MAX_LEN: usize = 200;
const CONTENT_MAX_LEN: usize = 50_000;
const COMMENT_MAX_LEN: usize = 5_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub featured_image_url: Option<String>,
}

/// Publish a post and notify every follower of the author.
pub async fn create_post(
    state: &AppState,
    author_id: &str,
    request: CreatePost,
) -> Result<PostRow, AppError> {
    require_text("title", &request.title, TITLE_MAX_LEN)?;
    require_text("content", &request.content, CONTENT_MAX_LEN)?;
    get_user(state, author_id)?;

    let row = PostRow {
        id: Uuid::now_v7().to_string(),
        user_id: author_id.to_string(),
        title: request.title,
        content: request.content,
        featured_image_url: optional_text(request.featured_image_url),
        created_at: timestamp_now(),
        views_count: 0,
        comments_count: 0,
    };
    queries::insert_post(&state.db, &row)?;

    let followers = queries::list_follower_ids(&state.db, author_id)?;
    tracing::info!(
        post_id = %row.id,
        author_id,
        followers = followers.len(),
        "post created"
    );

    let events = followers
        .into_iter()
        .map(|follower_id| NotificationEvent::new_post(follower_id, author_id, row.id.as_str()))
        .collect();
    notify(state, events).await;
    Ok(row)
}

pub fn get_post(state: &AppState, post_id: &str) -> Result<PostRow, AppError> {
    require_id("post id", post_id)?;
    queries::get_post(&state.db, post_id)?
        .ok_or_else(|| AppError::NotFound(format!("post not found: {post_id}")))
}

/// Count a view. Authors viewing their own post are refused; repeat views
/// by the same user are accepted but counted once. Returns the view count.
pub fn view_post(state: &AppState, viewer_id: &str, post_id: &str) -> Result<i64, AppError> {
    get_user(state, viewer_id)?;
    let post = get_post(state, post_id)?;
    if post.user_id == viewer_id {
        return Err(AppError::Forbidden(
            "views of your own post are not counted".to_string(),
        ));
    }

    let counted = queries::record_post_view(&state.db, post_id, viewer_id, &timestamp_now())?;
    Ok(if counted {
        post.views_count + 1
    } else {
        post.views_count
    })
}

/// Most viewed posts first. `search` matches title or content.
pub fn list_posts(
    state: &AppState,
    search: Option<String>,
    page: PageRequest,
) -> Result<Page<PostRow>, AppError> {
    let filters = search
        .map(|text| vec![Filter::search(&["p.title", "p.content"], text)])
        .unwrap_or_default();
    posts_page(state, filters, page)
}

pub fn list_user_posts(
    state: &AppState,
    user_id: &str,
    page: PageRequest,
) -> Result<Page<PostRow>, AppError> {
    get_user(state, user_id)?;
    posts_page(state, vec![Filter::equals("p.user_id", user_id)], page)
}

fn posts_page(
    state: &AppState,
    filters: Vec<Filter>,
    page: PageRequest,
) -> Result<Page<PostRow>, AppError> {
    let spec = page.to_query::<PostsCursor>(filters, &state.config.pagination)?;
    let rows = queries::list_posts(&state.db, &spec)?;
    Ok(assemble(rows, spec.page_limit, |row| PostsCursor::from(row))?)
}

pub fn create_comment(
    state: &AppState,
    user_id: &str,
    post_id: &str,
    content: String,
) -> Result<CommentRow, AppError> {
    require_text("content", &content, COMMENT_MAX_LEN)?;
    get_user(state, user_id)?;
    get_post(state, post_id)?;

    let row = CommentRow {
        id: Uuid::now_v7().to_string(),
        post_id: post_id.to_string(),
        user_id: user_id.to_string(),
        content,
        created_at: timestamp_now(),
    };
    queries::insert_comment(&state.db, &row)?;
    Ok(row)
}

/// Comments on a post, oldest first.
pub fn list_post_comments(
    state: &AppState,
    post_id: &str,
    page: PageRequest,
) -> Result<Page<CommentRow>, AppError> {
    get_post(state, post_id)?;
    let filters = vec![Filter::equals("c.post_id", post_id)];
    let spec = page.to_query::<CommentsCursor>(filters, &state.config.pagination)?;
    let rows = queries::list_comments(&state.db, &spec)?;
    Ok(assemble(rows, spec.page_limit, |row| CommentsCursor::from(row))?)
}
