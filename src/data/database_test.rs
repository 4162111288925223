//! Database tests

use super::*;
use chrono::Utc;
use tempfile::TempDir;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

fn federated_post(uri: &str) -> NewPost {
    NewPost {
        uri: Some(uri.to_string()),
        content_warning: None,
        content: "hello from afar".to_string(),
        author_name: "Bob".to_string(),
        author_handle: "bob".to_string(),
        origin_host: "remote.example".to_string(),
        visibility: Visibility::Public,
        created_at: Utc::now(),
    }
}

fn local_draft(visibility: Visibility) -> NewPost {
    NewPost {
        uri: None,
        content_warning: None,
        content: "local words".to_string(),
        author_name: "Alice".to_string(),
        author_handle: "alice".to_string(),
        origin_host: "local.example".to_string(),
        visibility,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
    // Connection successful if we get here without panicking
}

#[tokio::test]
async fn test_profile_seed_only_once() {
    let (db, _temp_dir) = create_test_db().await;

    let profile = Profile {
        handle: "alice".to_string(),
        display_name: "Alice".to_string(),
        bio: "Test bio".to_string(),
        avatar_url: None,
        updated_at: Utc::now(),
    };
    assert!(db.seed_profile(&profile).await.unwrap());

    let mut changed = profile.clone();
    changed.handle = "mallory".to_string();
    assert!(!db.seed_profile(&changed).await.unwrap());

    let stored = db.get_profile().await.unwrap().unwrap();
    assert_eq!(stored.handle, "alice");
    assert_eq!(stored.bio, "Test bio");
}

#[tokio::test]
async fn test_follower_upsert_refreshes_inbox() {
    let (db, _temp_dir) = create_test_db().await;

    db.upsert_follower("https://remote.example/users/bob", "https://remote.example/old")
        .await
        .unwrap();
    db.upsert_follower("https://remote.example/users/bob", "https://remote.example/inbox")
        .await
        .unwrap();

    let followers = db.list_followers().await.unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0].inbox_iri, "https://remote.example/inbox");
    assert_eq!(db.count_followers().await.unwrap(), 1);
}

#[tokio::test]
async fn test_follower_remove() {
    let (db, _temp_dir) = create_test_db().await;

    db.upsert_follower("https://remote.example/users/bob", "https://remote.example/inbox")
        .await
        .unwrap();

    assert!(db.remove_follower("https://remote.example/users/bob").await.unwrap());
    assert!(!db.remove_follower("https://remote.example/users/bob").await.unwrap());
    assert!(db.list_followers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_local_post_gets_uri_from_id() {
    let (db, _temp_dir) = create_test_db().await;

    let post = db
        .insert_local_post(&local_draft(Visibility::Public), "http://localhost/notes")
        .await
        .unwrap();

    assert!(post.is_local);
    assert_eq!(
        post.uri.as_deref(),
        Some(format!("http://localhost/notes/{}", post.id).as_str())
    );

    let by_uri = db
        .get_post_by_uri(post.uri.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_uri.id, post.id);
    assert_eq!(db.count_local_posts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_federated_post_insert_is_idempotent() {
    let (db, _temp_dir) = create_test_db().await;

    let post = federated_post("https://remote.example/notes/1");
    assert!(db.insert_federated_post(&post).await.unwrap());
    assert!(!db.insert_federated_post(&post).await.unwrap());

    let stored = db
        .get_post_by_uri("https://remote.example/notes/1")
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_local);
    assert_eq!(stored.visibility, Visibility::Public);
}

#[tokio::test]
async fn test_federated_post_requires_uri() {
    let (db, _temp_dir) = create_test_db().await;

    let mut post = federated_post("https://remote.example/notes/1");
    post.uri = None;
    assert!(db.insert_federated_post(&post).await.is_err());
}

#[tokio::test]
async fn test_update_post_content() {
    let (db, _temp_dir) = create_test_db().await;

    db.insert_federated_post(&federated_post("https://remote.example/notes/1"))
        .await
        .unwrap();

    let updated = db
        .update_post_content(
            "https://remote.example/notes/1",
            "edited",
            Some("cw".to_string()),
        )
        .await
        .unwrap();
    assert!(updated);

    let stored = db
        .get_post_by_uri("https://remote.example/notes/1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.content, "edited");
    assert_eq!(stored.content_warning.as_deref(), Some("cw"));

    assert!(!db
        .update_post_content("https://remote.example/notes/404", "x", None)
        .await
        .unwrap());

    let local = db
        .insert_local_post(&local_draft(Visibility::Public), "http://localhost/notes")
        .await
        .unwrap();
    assert!(!db
        .update_post_content(local.uri.as_deref().unwrap(), "forged", None)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_counters_floor_at_zero() {
    let (db, _temp_dir) = create_test_db().await;
    let uri = "https://remote.example/notes/1";

    db.insert_federated_post(&federated_post(uri)).await.unwrap();

    assert!(db.adjust_counter(uri, PostCounter::Likes, 1).await.unwrap());
    assert!(db.adjust_counter(uri, PostCounter::Likes, -1).await.unwrap());
    assert!(db.adjust_counter(uri, PostCounter::Likes, -1).await.unwrap());
    assert!(db.adjust_counter(uri, PostCounter::Shares, 1).await.unwrap());

    let stored = db.get_post_by_uri(uri).await.unwrap().unwrap();
    assert_eq!(stored.like_count, 0);
    assert_eq!(stored.share_count, 1);

    assert!(!db
        .adjust_counter("https://remote.example/notes/404", PostCounter::Likes, 1)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_remote_delete_skips_local_posts() {
    let (db, _temp_dir) = create_test_db().await;

    let local = db
        .insert_local_post(&local_draft(Visibility::Public), "http://localhost/notes")
        .await
        .unwrap();
    let local_uri = local.uri.clone().unwrap();

    assert!(!db.delete_federated_post(&local_uri).await.unwrap());
    assert!(db.get_post(local.id).await.unwrap().is_some());

    db.insert_federated_post(&federated_post("https://remote.example/notes/1"))
        .await
        .unwrap();
    assert!(db
        .delete_federated_post("https://remote.example/notes/1")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_delete_local_post_returns_row() {
    let (db, _temp_dir) = create_test_db().await;

    let local = db
        .insert_local_post(&local_draft(Visibility::Unlisted), "http://localhost/notes")
        .await
        .unwrap();

    let deleted = db.delete_local_post(local.id).await.unwrap().unwrap();
    assert_eq!(deleted.uri, local.uri);
    assert!(db.delete_local_post(local.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_listed_local_posts_excludes_private() {
    let (db, _temp_dir) = create_test_db().await;

    for visibility in [
        Visibility::Public,
        Visibility::Unlisted,
        Visibility::FollowersOnly,
        Visibility::Private,
    ] {
        db.insert_local_post(&local_draft(visibility), "http://localhost/notes")
            .await
            .unwrap();
    }
    db.insert_federated_post(&federated_post("https://remote.example/notes/1"))
        .await
        .unwrap();

    let listed = db.list_listed_local_posts(20).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|post| post.is_local && post.visibility.is_listed()));
}

#[tokio::test]
async fn test_key_pair_insert_keeps_first_writer() {
    let (db, _temp_dir) = create_test_db().await;
    let actor = "http://localhost/profile";

    let first = KeyPair::new(actor, "PUB-1".to_string(), "PRIV-1".to_string());
    let second = KeyPair::new(actor, "PUB-2".to_string(), "PRIV-2".to_string());

    let stored = db.insert_key_pair_if_absent(&first).await.unwrap();
    assert_eq!(stored.public_key_pem, "PUB-1");

    let stored = db.insert_key_pair_if_absent(&second).await.unwrap();
    assert_eq!(stored.public_key_pem, "PUB-1");
    assert_eq!(stored.private_key_pem, "PRIV-1");

    assert!(db.get_key_pair("http://other/profile").await.unwrap().is_none());
}
