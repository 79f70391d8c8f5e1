//! Common test utilities for blogwire integration tests.

#![allow(dead_code, unused_imports)]

pub mod counting_sink;

use std::path::Path;
use std::sync::Arc;

use blogwire_lib::commands::users::{self, RegisterUser};
use blogwire_lib::config::ServiceConfig;
use blogwire_lib::db::queries::UserRow;
use blogwire_lib::db::Database;
use blogwire_lib::AppState;

pub use counting_sink::CountingSink;

/// File-backed state under `dir`, with the dispatcher started.
pub fn file_state(dir: &Path, config: ServiceConfig) -> AppState {
    let db = Arc::new(Database::open(dir.join("blogwire.db")).expect("open database"));
    let state = AppState::new(db, config);
    state.start().expect("start dispatcher");
    state
}

pub fn register(state: &AppState, username: &str) -> UserRow {
    users::register_user(
        state,
        RegisterUser {
            name: username.to_string(),
            username: username.to_string(),
            profile_image_url: None,
        },
    )
    .expect("register user")
}
