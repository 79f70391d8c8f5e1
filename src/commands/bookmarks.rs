use crate::commands::posts::get_post;
use crate::commands::users::get_user;
use crate::db::queries::{self, BookmarkedPostRow};
use crate::db::timestamp_now;
use crate::pagination::resources::BookmarksCursor;
use crate::pagination::{assemble, Filter, Page, PageRequest};
use crate::{AppError, AppState};

pub fn add_bookmark(state: &AppState, user_id: &str, post_id: &str) -> Result<(), AppError> {
    get_user(state, user_id)?;
    get_post(state, post_id)?;
    queries::insert_bookmark(&state.db, user_id, post_id, &timestamp_now())?;
    Ok(())
}

pub fn remove_bookmark(state: &AppState, user_id: &str, post_id: &str) -> Result<(), AppError> {
    get_post(state, post_id)?;
    if !queries::delete_bookmark(&state.db, user_id, post_id)? {
        return Err(AppError::NotFound("bookmark not found".to_string()));
    }
    Ok(())
}

/// A user's bookmarked posts, most recently bookmarked first.
pub fn list_bookmarks(
    state: &AppState,
    user_id: &str,
    page: PageRequest,
) -> Result<Page<BookmarkedPostRow>, AppError> {
    get_user(state, user_id)?;
    let filters = vec![Filter::equals("b.user_id", user_id)];
    let spec = page.to_query::<BookmarksCursor>(filters, &state.config.pagination)?;
    let rows = queries::list_bookmarks(&state.db, &spec)?;
    Ok(assemble(rows, spec.page_limit, |row| BookmarksCursor::from(row))?)
}
