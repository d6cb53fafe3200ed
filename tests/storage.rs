//! Durability tests against a file-backed store

mod common;

use common::{Behavior, MockConnector, MockProvider};
use companion_chat::db::{self, keys};
use companion_chat::{
    ContextTurn, GatewayStatus, GenerationOutcome, MessageKind, MessageRepo, ProviderGateway,
    Sender, SettingsRepo, TurnRole,
};

#[test]
fn test_messages_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("companion.db");

    {
        let pool = db::init(&path).unwrap();
        let repo = MessageRepo::new(pool, "Mimi");
        repo.append(Sender::User, "salut", MessageKind::Text).unwrap();
        repo.append(Sender::Assistant, "coucou", MessageKind::Text)
            .unwrap();
    }

    let pool = db::init(&path).unwrap();
    let repo = MessageRepo::new(pool, "Mimi");
    let log = repo.recent(10).unwrap();

    assert_eq!(log.len(), 2);
    assert_eq!(log[0].sender, Sender::User);
    assert_eq!(log[0].content, "salut");
    assert_eq!(log[1].sender, Sender::Assistant);
    assert_eq!(log[1].content, "coucou");
}

#[test]
fn test_recent_tail_after_many_appends() {
    let pool = common::setup_test_db();
    let repo = MessageRepo::new(pool, "Mimi");
    for i in 0..40 {
        repo.append(Sender::User, &format!("m{i}"), MessageKind::Text)
            .unwrap();
    }

    let tail = repo.recent(5).unwrap();
    let contents: Vec<_> = tail.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m35", "m36", "m37", "m38", "m39"]);
    assert!(tail.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn test_credential_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("companion.db");
    let provider = MockProvider::new(Behavior::Echo);

    {
        let pool = db::init(&path).unwrap();
        let gateway = ProviderGateway::new(
            SettingsRepo::new(pool),
            MockConnector::new(provider.clone()),
        );
        assert_eq!(
            gateway.configure("  sk-test-credential  ").unwrap(),
            GatewayStatus::Configured
        );
    }

    let pool = db::init(&path).unwrap();
    let settings = SettingsRepo::new(pool);
    assert_eq!(
        settings.get(keys::PROVIDER_API_KEY).unwrap().as_deref(),
        Some("sk-test-credential")
    );

    let connector = MockConnector::new(provider.clone());
    let gateway = ProviderGateway::from_store(settings, connector.clone()).unwrap();
    assert!(gateway.status().is_configured());
    assert_eq!(
        connector.connects.load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    let outcome = tokio_test::block_on(
        gateway.generate(&[ContextTurn::new(TurnRole::User, "still there?")]),
    );
    assert_eq!(outcome, GenerationOutcome::Reply("still there?".to_string()));
}

#[test]
fn test_cleared_credential_stays_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("companion.db");
    let provider = MockProvider::new(Behavior::Echo);

    {
        let pool = db::init(&path).unwrap();
        let gateway = ProviderGateway::new(
            SettingsRepo::new(pool),
            MockConnector::new(provider.clone()),
        );
        gateway.configure("sk-test-credential").unwrap();
        gateway.configure("").unwrap();
    }

    let pool = db::init(&path).unwrap();
    let gateway =
        ProviderGateway::from_store(SettingsRepo::new(pool), MockConnector::new(provider.clone()))
            .unwrap();
    assert_eq!(
        gateway.status(),
        GatewayStatus::Unconfigured { reason: None }
    );

    let outcome = tokio_test::block_on(
        gateway.generate(&[ContextTurn::new(TurnRole::User, "hello")]),
    );
    assert_eq!(outcome, GenerationOutcome::Unconfigured);
    assert_eq!(provider.calls(), 0);
}
