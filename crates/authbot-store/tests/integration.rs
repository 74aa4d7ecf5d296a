//! Integration tests for authbot-store against an on-disk database.

use std::sync::Arc;
use std::time::Duration;

use authbot_store::{
    BotStateStore, Database, MokaPendingLogins, PendingLogin, PendingLoginRegistry,
    SessionTokenStore, SessionTokens, SqlitePendingLogins, SqliteSessionTokenStore,
};
use chrono::Utc;

fn pending(code: &str, conversation: &str) -> PendingLogin {
    PendingLogin {
        magic_code: code.to_string(),
        conversation_key: conversation.to_string(),
        display_name: "Grace".to_string(),
        access_token: "graph-at".to_string(),
        refresh_token: Some("rt-0".to_string()),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn sign_in_lifecycle_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authbot.db");

    {
        let db = Database::open_and_migrate(path.clone()).await.unwrap();
        let sessions = SqliteSessionTokenStore::new(db.clone());
        let state = BotStateStore::new(db);

        sessions
            .put(
                "telegram:42:7",
                &SessionTokens {
                    user_name: "Grace".to_string(),
                    access_token: "graph-at".to_string(),
                    refresh_token: "rt-1".to_string(),
                    access_token_crm: "crm-at".to_string(),
                    updated_at: Utc::now().timestamp(),
                },
            )
            .await
            .unwrap();
        state.set_telegram_offset(99).await.unwrap();
    }

    let db = Database::open_and_migrate(path).await.unwrap();
    let sessions = SqliteSessionTokenStore::new(db.clone());
    let state = BotStateStore::new(db);

    let got = sessions.get("telegram:42:7").await.unwrap().unwrap();
    assert_eq!(got.refresh_token, "rt-1");
    assert_eq!(state.telegram_offset().await.unwrap(), Some(99));
}

#[tokio::test]
async fn backends_agree_on_claim_semantics() {
    let db = Database::in_memory_migrated().await.unwrap();
    let backends: Vec<Arc<dyn PendingLoginRegistry>> = vec![
        Arc::new(MokaPendingLogins::new(Duration::from_secs(60))),
        Arc::new(SqlitePendingLogins::new(db, Duration::from_secs(60))),
    ];

    for registry in backends {
        registry.put(pending("c0ffee01", "conv-1")).await.unwrap();
        registry.put(pending("c0ffee02", "conv-2")).await.unwrap();
        assert_eq!(registry.len().await.unwrap(), 2);

        let claimed = registry.take("c0ffee01").await.unwrap().unwrap();
        assert_eq!(claimed.conversation_key, "conv-1");
        assert_eq!(claimed.refresh_token.as_deref(), Some("rt-0"));
        assert!(registry.take("c0ffee01").await.unwrap().is_none());

        assert!(registry.release_conversation("conv-2").await.unwrap());
        assert_eq!(registry.len().await.unwrap(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_claims_on_disk_have_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("race.db"))
        .await
        .unwrap();
    let registry = Arc::new(SqlitePendingLogins::new(db, Duration::from_secs(60)));
    registry.put(pending("deadbeef", "conv-1")).await.unwrap();

    let attempts = (0..8).map(|_| {
        let registry = Arc::clone(&registry);
        async move { registry.take("deadbeef").await.unwrap() }
    });
    let results = futures::future::join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
}
