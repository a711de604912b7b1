// ABOUTME: Integration tests for the vault and secret store working across process restarts.
// ABOUTME: Exercises key persistence, concurrent writers, and on-disk hygiene end to end.

use std::sync::Arc;

use serde_json::json;

use lockclaw::vault::{FileBackend, KeyVault, SecretStore, StoreError};

fn store_over(dir: &std::path::Path) -> Arc<SecretStore> {
    let vault = Arc::new(KeyVault::new(
        Box::new(FileBackend::new(dir.join("master.key"))),
        None,
    ));
    Arc::new(SecretStore::new(vault, dir.join("secrets.enc")))
}

#[tokio::test]
async fn secrets_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = store_over(dir.path());
        store
            .save("github", json!({ "access_token": "abc", "token_type": "Bearer" }))
            .await
            .unwrap();
        store.save("slack", json!("xoxb-123")).await.unwrap();
    }

    // A fresh vault and store over the same directory must load the same
    // master key from the key file and decrypt the same map.
    let store = store_over(dir.path());
    assert_eq!(
        store.get("github").await.unwrap(),
        Some(json!({ "access_token": "abc", "token_type": "Bearer" })),
    );
    assert_eq!(store.names().await.unwrap(), vec!["github", "slack"]);
}

#[tokio::test]
async fn a_different_key_cannot_read_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_over(dir.path());
    store.save("github", json!("secret")).await.unwrap();

    // Swap in a vault whose key file lives elsewhere, so it generates a
    // fresh key instead of loading the original.
    let other = tempfile::tempdir().unwrap();
    let vault = Arc::new(KeyVault::new(
        Box::new(FileBackend::new(other.path().join("master.key"))),
        None,
    ));
    let foreign = SecretStore::new(vault, dir.path().join("secrets.enc"));

    match foreign.get("github").await {
        Err(StoreError::Unreadable(_)) => {}
        other => panic!("expected Unreadable, got {:?}", other),
    }
}

#[tokio::test]
async fn concurrent_saves_both_land() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_over(dir.path());

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.save(&format!("name-{i}"), json!(i)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.names().await.unwrap().len(), 8);
    for i in 0..8 {
        assert_eq!(store.get(&format!("name-{i}")).await.unwrap(), Some(json!(i)));
    }
}

#[tokio::test]
async fn delete_on_a_missing_store_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_over(dir.path());

    assert!(!store.delete("absent").await.unwrap());
    assert!(!dir.path().join("secrets.enc").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn key_and_store_files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let store = store_over(dir.path());
    store.save("github", json!("secret")).await.unwrap();

    for name in ["master.key", "secrets.enc"] {
        let mode = std::fs::metadata(dir.path().join(name))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600, "{name} must be owner-only");
    }
}

#[tokio::test]
async fn store_file_is_iv_colon_ciphertext() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_over(dir.path());
    store.save("github", json!("secret")).await.unwrap();

    let wire = std::fs::read_to_string(dir.path().join("secrets.enc")).unwrap();
    let (iv, ciphertext) = wire.split_once(':').expect("single-colon wire format");

    use base64::Engine as _;
    let engine = base64::engine::general_purpose::STANDARD;
    assert_eq!(engine.decode(iv).unwrap().len(), 12);
    // GCM tag alone is 16 bytes, so the payload is never shorter.
    assert!(engine.decode(ciphertext).unwrap().len() > 16);
}
