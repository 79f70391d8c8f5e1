//! Database query tests, including full keyset walks over seeded tables.

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use rusqlite::params;

use crate::config::PaginationConfig;
use crate::db::queries::{self, CommentRow, NewNotification, PostRow};
use crate::db::{timestamp_now, Database, DbError};
use crate::pagination::resources::{
    BookmarksCursor, CommentsCursor, FollowersCursor, NotificationsCursor, PostsCursor, UsersCursor,
};
use crate::pagination::{assemble, Filter, Page, PageRequest};
use crate::testing::{seed_post, seed_user, set_user_counters};

fn posts_page(db: &Database, filters: Vec<Filter>, request: &PageRequest) -> Page<PostRow> {
    let spec = request
        .to_query::<PostsCursor>(filters, &PaginationConfig::default())
        .unwrap();
    let rows = queries::list_posts(db, &spec).unwrap();
    assert!(rows.len() <= spec.fetch_limit());
    assemble(rows, spec.page_limit, |row| PostsCursor::from(row)).unwrap()
}

fn walk_posts(db: &Database, filters: Vec<Filter>, limit: i64) -> Vec<Page<PostRow>> {
    let mut pages = Vec::new();
    let mut request = PageRequest::first(limit);
    loop {
        let page = posts_page(db, filters.clone(), &request);
        let next = page.next_cursor.clone();
        pages.push(page);
        match next {
            Some(token) => request = PageRequest::after(token, limit),
            None => break,
        }
        assert!(pages.len() < 100, "pagination did not terminate");
    }
    pages
}

fn expected_post_order(mut posts: Vec<PostRow>) -> Vec<String> {
    posts.sort_by(|a, b| (b.views_count, &b.id).cmp(&(a.views_count, &a.id)));
    posts.into_iter().map(|p| p.id).collect()
}

#[test]
fn migrations_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blogwire.db");
    {
        let db = Database::open(&path).unwrap();
        seed_user(&db, "alice");
    }
    let db = Database::open(&path).unwrap();
    let versions: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
        .unwrap();
    assert_eq!(versions, 2);
    let kinds: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM notification_kinds", [], |r| r.get(0))
        .unwrap();
    assert_eq!(kinds, 2);
}

#[test]
fn twenty_three_posts_page_as_ten_ten_three() {
    let db = Database::open_in_memory().unwrap();
    let author = seed_user(&db, "author");
    let posts: Vec<PostRow> = (0..23)
        .map(|i| seed_post(&db, &author.id, &format!("post {i}"), (i % 4) as i64))
        .collect();

    let pages = walk_posts(&db, Vec::new(), 10);
    let sizes: Vec<usize> = pages.iter().map(|p| p.count).collect();
    assert_eq!(sizes, vec![10, 10, 3]);
    assert!(pages[0].has_more && pages[1].has_more && !pages[2].has_more);
    assert!(pages[0].next_cursor.is_some() && pages[1].next_cursor.is_some());
    assert_eq!(pages[2].next_cursor, None);

    let walked: Vec<String> = pages
        .iter()
        .flat_map(|p| p.items.iter().map(|r| r.id.clone()))
        .collect();
    assert_eq!(walked, expected_post_order(posts));
}

#[test]
fn cursor_is_the_last_returned_row_not_the_probe() {
    let db = Database::open_in_memory().unwrap();
    let author = seed_user(&db, "author");
    for i in 0..12 {
        seed_post(&db, &author.id, &format!("post {i}"), i);
    }

    let page = posts_page(&db, Vec::new(), &PageRequest::first(10));
    let token = page.next_cursor.clone().unwrap();
    let cursor: PostsCursor = crate::pagination::decode_cursor(&token).unwrap().unwrap();
    let last = page.items.last().unwrap();
    assert_eq!(cursor, PostsCursor::from(last));

    let next = posts_page(&db, Vec::new(), &PageRequest::after(token, 10));
    assert_eq!(next.count, 2);
    assert!(page.items.iter().all(|a| next.items.iter().all(|b| a.id != b.id)));
}

#[test]
fn equal_sort_values_are_broken_by_id() {
    let db = Database::open_in_memory().unwrap();
    let author = seed_user(&db, "author");
    let posts: Vec<PostRow> = (0..25)
        .map(|i| seed_post(&db, &author.id, &format!("same {i}"), 5))
        .collect();

    let pages = walk_posts(&db, Vec::new(), 10);
    let walked: Vec<String> = pages
        .iter()
        .flat_map(|p| p.items.iter().map(|r| r.id.clone()))
        .collect();
    let unique: HashSet<&String> = walked.iter().collect();
    assert_eq!(unique.len(), 25);
    assert_eq!(walked, expected_post_order(posts));
}

#[test]
fn rows_inserted_mid_walk_do_not_duplicate_earlier_rows() {
    let db = Database::open_in_memory().unwrap();
    let author = seed_user(&db, "author");
    for i in 0..15 {
        seed_post(&db, &author.id, &format!("post {i}"), 10 + i);
    }

    let first = posts_page(&db, Vec::new(), &PageRequest::first(10));
    // New rows sort ahead of the boundary; the next page must not shift.
    seed_post(&db, &author.id, "hot", 1_000);
    seed_post(&db, &author.id, "hotter", 2_000);
    let second = posts_page(
        &db,
        Vec::new(),
        &PageRequest::after(first.next_cursor.clone().unwrap(), 10),
    );

    assert_eq!(second.count, 5);
    let seen: HashSet<&String> = first.items.iter().map(|p| &p.id).collect();
    assert!(second.items.iter().all(|p| !seen.contains(&p.id)));
}

#[test]
fn filters_narrow_without_changing_order() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");
    let mut alice_posts = Vec::new();
    for i in 0..14 {
        alice_posts.push(seed_post(&db, &alice.id, &format!("rust tip {i}"), i % 3));
        seed_post(&db, &bob.id, &format!("go tip {i}"), i % 3);
    }

    let pages = walk_posts(&db, vec![Filter::equals("p.user_id", alice.id.as_str())], 10);
    let walked: Vec<String> = pages
        .iter()
        .flat_map(|p| p.items.iter().map(|r| r.id.clone()))
        .collect();
    assert_eq!(walked, expected_post_order(alice_posts.clone()));

    let searched = walk_posts(&db, vec![Filter::search(&["p.title", "p.content"], "RUST")], 10);
    let total: usize = searched.iter().map(|p| p.count).sum();
    assert_eq!(total, 14);
}

#[test]
fn users_ranked_by_followers_then_posts_then_id() {
    let db = Database::open_in_memory().unwrap();
    let mut users = Vec::new();
    for i in 0..13 {
        let user = seed_user(&db, &format!("user{i:02}"));
        set_user_counters(&db, &user.id, (i % 3) as i64, (i % 2) as i64);
        users.push(queries::get_user(&db, &user.id).unwrap().unwrap());
    }
    users.sort_by(|a, b| {
        (b.followers_count, b.posts_count, &b.id).cmp(&(a.followers_count, a.posts_count, &a.id))
    });

    let config = PaginationConfig::default();
    let mut request = PageRequest::first(10);
    let mut walked = Vec::new();
    loop {
        let spec = request.to_query::<UsersCursor>(Vec::new(), &config).unwrap();
        let rows = queries::list_users(&db, &spec).unwrap();
        let page = assemble(rows, spec.page_limit, |row| UsersCursor::from(row)).unwrap();
        walked.extend(page.items.into_iter().map(|u| u.id));
        match page.next_cursor {
            Some(token) => request = PageRequest::after(token, 10),
            None => break,
        }
    }

    let expected: Vec<String> = users.into_iter().map(|u| u.id).collect();
    assert_eq!(walked, expected);
}

#[test]
fn follow_updates_counters_and_followers_list() {
    let db = Database::open_in_memory().unwrap();
    let star = seed_user(&db, "star");
    let fans: Vec<_> = (0..12).map(|i| seed_user(&db, &format!("fan{i}"))).collect();
    for fan in &fans {
        queries::insert_follow(&db, &fan.id, &star.id, &timestamp_now()).unwrap();
    }

    let duplicate = queries::insert_follow(&db, &fans[0].id, &star.id, &timestamp_now());
    assert!(matches!(duplicate, Err(DbError::Conflict(_))));

    let star_row = queries::get_user(&db, &star.id).unwrap().unwrap();
    assert_eq!(star_row.followers_count, 12);
    assert_eq!(
        queries::get_user(&db, &fans[0].id).unwrap().unwrap().following_count,
        1
    );

    let config = PaginationConfig::default();
    let filters = vec![Filter::equals("f.followed_id", star.id.as_str())];
    let spec = PageRequest::first(10)
        .to_query::<FollowersCursor>(filters.clone(), &config)
        .unwrap();
    let page = assemble(queries::list_followers(&db, &spec).unwrap(), 10, |row| {
        FollowersCursor::from(row)
    })
    .unwrap();
    assert_eq!(page.count, 10);

    let spec = PageRequest::after(page.next_cursor.clone().unwrap(), 10)
        .to_query::<FollowersCursor>(filters, &config)
        .unwrap();
    let rest = queries::list_followers(&db, &spec).unwrap();
    assert_eq!(rest.len(), 2);

    let mut expected: Vec<String> = fans.iter().map(|f| f.id.clone()).collect();
    expected.sort();
    let walked: Vec<String> = page
        .items
        .iter()
        .chain(rest.iter())
        .map(|u| u.id.clone())
        .collect();
    assert_eq!(walked, expected);
    assert_eq!(queries::list_follower_ids(&db, &star.id).unwrap(), expected);

    assert!(queries::delete_follow(&db, &fans[0].id, &star.id).unwrap());
    assert!(!queries::delete_follow(&db, &fans[0].id, &star.id).unwrap());
    assert_eq!(
        queries::get_user(&db, &star.id).unwrap().unwrap().followers_count,
        11
    );
}

#[test]
fn self_follow_is_rejected_by_schema() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let err = queries::insert_follow(&db, &alice.id, &alice.id, &timestamp_now()).unwrap_err();
    assert!(err.is_constraint_violation());
}

#[test]
fn duplicate_username_is_a_conflict() {
    let db = Database::open_in_memory().unwrap();
    seed_user(&db, "alice");
    let row = queries::UserRow {
        id: uuid::Uuid::now_v7().to_string(),
        name: "Other Alice".to_string(),
        username: "alice".to_string(),
        profile_image_url: None,
        joined_at: timestamp_now(),
        posts_count: 0,
        following_count: 0,
        followers_count: 0,
    };
    assert!(matches!(
        queries::insert_user(&db, &row),
        Err(DbError::Conflict(_))
    ));
}

#[test]
fn views_count_once_per_viewer() {
    let db = Database::open_in_memory().unwrap();
    let author = seed_user(&db, "author");
    let reader = seed_user(&db, "reader");
    let post = seed_post(&db, &author.id, "hello", 0);

    assert!(queries::record_post_view(&db, &post.id, &reader.id, &timestamp_now()).unwrap());
    assert!(!queries::record_post_view(&db, &post.id, &reader.id, &timestamp_now()).unwrap());
    assert_eq!(queries::get_post(&db, &post.id).unwrap().unwrap().views_count, 1);
    assert_eq!(queries::get_user(&db, &author.id).unwrap().unwrap().posts_count, 1);
}

#[test]
fn comments_page_oldest_first() {
    let db = Database::open_in_memory().unwrap();
    let author = seed_user(&db, "author");
    let post = seed_post(&db, &author.id, "hello", 0);
    let mut ids = Vec::new();
    for i in 0..11 {
        let row = CommentRow {
            id: uuid::Uuid::now_v7().to_string(),
            post_id: post.id.clone(),
            user_id: author.id.clone(),
            content: format!("comment {i}"),
            created_at: timestamp_now(),
        };
        queries::insert_comment(&db, &row).unwrap();
        ids.push(row.id);
    }
    ids.sort();

    let filters = vec![Filter::equals("c.post_id", post.id.as_str())];
    let spec = PageRequest::first(10)
        .to_query::<CommentsCursor>(filters, &PaginationConfig::default())
        .unwrap();
    let page = assemble(queries::list_comments(&db, &spec).unwrap(), 10, |row| {
        CommentsCursor::from(row)
    })
    .unwrap();

    let got: Vec<String> = page.items.iter().map(|c| c.id.clone()).collect();
    assert_eq!(got, ids[..10].to_vec());
    assert!(page.has_more);
    assert_eq!(queries::get_post(&db, &post.id).unwrap().unwrap().comments_count, 11);
}

#[test]
fn bookmarks_with_equal_timestamps_page_by_post_id() {
    let db = Database::open_in_memory().unwrap();
    let author = seed_user(&db, "author");
    let reader = seed_user(&db, "reader");
    let stamps = ["2024-01-01T00:00:00.000000Z", "2024-01-02T00:00:00.000000Z"];

    let mut expected = Vec::new();
    for i in 0..12 {
        let post = seed_post(&db, &author.id, &format!("post {i}"), 0);
        let at = stamps[i % 2];
        queries::insert_bookmark(&db, &reader.id, &post.id, at).unwrap();
        expected.push((at.to_string(), post.id));
    }
    expected.sort_by(|a, b| b.cmp(a));
    let expected: Vec<String> = expected.into_iter().map(|(_, id)| id).collect();

    let config = PaginationConfig::default();
    let filters = vec![Filter::equals("b.user_id", reader.id.as_str())];
    let mut request = PageRequest::first(10);
    let mut walked = Vec::new();
    loop {
        let spec = request
            .to_query::<BookmarksCursor>(filters.clone(), &config)
            .unwrap();
        let page = assemble(queries::list_bookmarks(&db, &spec).unwrap(), 10, |row| {
            BookmarksCursor::from(row)
        })
        .unwrap();
        walked.extend(page.items.into_iter().map(|b| b.post.id));
        match page.next_cursor {
            Some(token) => request = PageRequest::after(token, 10),
            None => break,
        }
    }
    assert_eq!(walked, expected);

    let again = queries::insert_bookmark(&db, &reader.id, &walked[0], stamps[0]);
    assert!(matches!(again, Err(DbError::Conflict(_))));
    assert!(queries::delete_bookmark(&db, &reader.id, &walked[0]).unwrap());
    assert!(!queries::delete_bookmark(&db, &reader.id, &walked[0]).unwrap());
}

#[test]
fn notifications_newest_first_with_unread_counts() {
    let db = Database::open_in_memory().unwrap();
    let alice = seed_user(&db, "alice");
    let bob = seed_user(&db, "bob");

    let mut ids = Vec::new();
    for _ in 0..12 {
        let row = NewNotification {
            id: uuid::Uuid::now_v7().to_string(),
            kind_id: 1,
            user_id: alice.id.clone(),
            sender_id: Some(bob.id.clone()),
            post_id: None,
            is_read: false,
        };
        let stored = queries::insert_notification(&db, &row, &timestamp_now()).unwrap();
        assert_eq!(stored.kind, "new_follower");
        ids.push(stored.id);
    }
    ids.sort_by(|a, b| b.cmp(a));

    let filters = vec![Filter::equals("n.user_id", alice.id.as_str())];
    let spec = PageRequest::first(10)
        .to_query::<NotificationsCursor>(filters, &PaginationConfig::default())
        .unwrap();
    let page = assemble(queries::list_notifications(&db, &spec).unwrap(), 10, |row| {
        NotificationsCursor::from(row)
    })
    .unwrap();
    let got: Vec<String> = page.items.iter().map(|n| n.id.clone()).collect();
    assert_eq!(got, ids[..10].to_vec());

    assert_eq!(queries::count_notifications(&db, &alice.id).unwrap(), 12);
    assert_eq!(queries::count_unread_notifications(&db, &alice.id).unwrap(), 12);
    assert!(queries::mark_notification_read(&db, &alice.id, &ids[0]).unwrap());
    assert!(!queries::mark_notification_read(&db, &bob.id, &ids[1]).unwrap());
    assert_eq!(queries::count_unread_notifications(&db, &alice.id).unwrap(), 11);

    let unknown_kind = NewNotification {
        id: uuid::Uuid::now_v7().to_string(),
        kind_id: 99,
        user_id: alice.id.clone(),
        sender_id: None,
        post_id: None,
        is_read: false,
    };
    assert!(matches!(
        queries::insert_notification(&db, &unknown_kind, &timestamp_now()),
        Err(DbError::NotFound(_))
    ));
}

#[test]
fn settings_round_trip() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(queries::get_setting(&db, "missing").unwrap(), None);
    queries::upsert_setting(&db, "k", "\"v1\"", &timestamp_now()).unwrap();
    queries::upsert_setting(&db, "k", "\"v2\"", &timestamp_now()).unwrap();
    assert_eq!(queries::get_setting(&db, "k").unwrap().as_deref(), Some("\"v2\""));

    let count: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM settings WHERE key = ?1", params!["k"], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 1);
}
