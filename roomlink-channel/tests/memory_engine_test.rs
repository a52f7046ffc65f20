// Integration tests for the in-memory channel engine
//
// Covers:
// - provider create/find semantics shared across clients
// - publish/subscribe lifecycle and cascades on leave
// - relay forwarding, propagation from the origin and visibility delay

use roomlink_channel::memory::{MemoryEngine, RelayVisibility};
use roomlink_channel::{
    ChannelError, ChannelEvent, ChannelProvider, ChannelState, LocalStream, MemberInit,
    MemberSide, PublicationOptions, PublicationState, SubscriptionOptions,
};
use std::time::Duration;

fn named(name: &str) -> MemberInit {
    MemberInit {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_then_find_from_another_client() {
    let engine = MemoryEngine::new();
    let alice = engine.provider();
    let bob = engine.provider();

    let created = alice.create(Some("lobby"), Some("meta")).await.unwrap();
    let found = bob.find(Some("lobby"), None).await.unwrap();

    assert_eq!(created.id(), found.id());
    assert_eq!(found.metadata(), "meta");
    assert_eq!(engine.channel_count(), 1);
}

#[tokio::test]
async fn test_create_duplicate_name_fails() {
    let engine = MemoryEngine::new();
    let provider = engine.provider();
    provider.create(Some("lobby"), None).await.unwrap();

    let err = provider.create(Some("lobby"), None).await.err().unwrap();
    assert!(matches!(err, ChannelError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_find_requires_name_or_id() {
    let provider = MemoryEngine::new().provider();
    let err = provider.find(None, None).await.err().unwrap();
    assert!(matches!(err, ChannelError::InvalidInput(_)));

    let err = provider.find(Some("missing"), None).await.err().unwrap();
    assert!(matches!(err, ChannelError::NotFound(_)));
}

#[tokio::test]
async fn test_find_or_create_reuses_existing() {
    let provider = MemoryEngine::new().provider();
    let first = provider.find_or_create(Some("lobby"), None).await.unwrap();
    let second = provider.find_or_create(Some("lobby"), None).await.unwrap();
    assert_eq!(first.id(), second.id());
}

#[tokio::test]
async fn test_side_is_relative_to_the_client() {
    let engine = MemoryEngine::new();
    let a = engine.provider().create(Some("c"), None).await.unwrap();
    let b = engine.provider().find(Some("c"), None).await.unwrap();

    let alice = a.join(named("alice")).await.unwrap();
    let bob = b.join(named("bob")).await.unwrap();

    assert_eq!(a.side_of(&alice.id()), MemberSide::Local);
    assert_eq!(a.side_of(&bob.id()), MemberSide::Remote);
    assert_eq!(b.side_of(&alice.id()), MemberSide::Remote);
    assert_eq!(a.members().len(), 2);
}

#[tokio::test]
async fn test_duplicate_member_name_rejected() {
    let channel = MemoryEngine::new()
        .provider()
        .create(None, None)
        .await
        .unwrap();
    channel.join(named("alice")).await.unwrap();
    let err = channel.join(named("alice")).await.err().unwrap();
    assert!(matches!(err, ChannelError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_publish_subscribe_and_leave_cascade() {
    let engine = MemoryEngine::new();
    let a = engine.provider().create(Some("c"), None).await.unwrap();
    let b = engine.provider().find(Some("c"), None).await.unwrap();
    let alice = a.join(named("alice")).await.unwrap();
    let bob = b.join(named("bob")).await.unwrap();

    let publication = alice
        .publish(LocalStream::audio(), PublicationOptions::default())
        .await
        .unwrap();
    let subscription = bob
        .subscribe(&publication.id, SubscriptionOptions::default())
        .await
        .unwrap();
    assert_eq!(subscription.publication, publication.id);
    assert_eq!(b.subscriptions().len(), 1);

    // cannot subscribe to your own publication
    let err = alice
        .subscribe(&publication.id, SubscriptionOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChannelError::InvalidInput(_)));

    let mut events = b.events();
    alice.leave().await.unwrap();

    assert!(a.publications().is_empty());
    assert!(a.subscriptions().is_empty());
    assert!(a.local_person().is_none());

    let mut saw_unpublished = false;
    let mut saw_left = false;
    while let Ok(event) = events.try_recv() {
        match event {
            ChannelEvent::StreamUnpublished(p) => saw_unpublished |= p.id == publication.id,
            ChannelEvent::MemberLeft(m) => saw_left |= m.id == alice.id(),
            _ => {}
        }
    }
    assert!(saw_unpublished);
    assert!(saw_left);
}

#[tokio::test]
async fn test_disabled_publication_initial_state() {
    let channel = MemoryEngine::new()
        .provider()
        .create(None, None)
        .await
        .unwrap();
    let alice = channel.join(MemberInit::default()).await.unwrap();
    let publication = alice
        .publish(
            LocalStream::video(),
            PublicationOptions {
                is_enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(publication.state, PublicationState::Disabled);

    channel.enable_publication(&publication.id).await.unwrap();
    assert_eq!(
        channel.publication(&publication.id).unwrap().state,
        PublicationState::Enabled
    );
}

#[tokio::test]
async fn test_forwarding_creates_visible_relay() {
    let engine = MemoryEngine::new();
    let channel = engine.provider().create(None, None).await.unwrap();
    let alice = channel.join(MemberInit::default()).await.unwrap();
    let bot = channel.create_bot("sfu").await.unwrap();
    assert_eq!(channel.bots().len(), 1);
    assert!(channel.bot(&bot.id()).is_some());
    assert!(channel.bot(&alice.id()).is_none());

    let origin = alice
        .publish(LocalStream::audio(), PublicationOptions::default())
        .await
        .unwrap();
    let descriptor = bot.start_forwarding(&origin.id, Some(3)).await.unwrap();
    assert_eq!(descriptor.configure.max_subscribers, 3);

    let relay = channel
        .publication(&descriptor.relaying_publication_id)
        .unwrap();
    assert_eq!(relay.origin.as_ref(), Some(&origin.id));
    assert_eq!(relay.publisher, bot.id());

    // origin changes propagate to the relay
    channel
        .update_publication_metadata(&origin.id, "updated")
        .await
        .unwrap();
    channel.disable_publication(&origin.id).await.unwrap();
    let relay = channel.publication(&relay.id).unwrap();
    assert_eq!(relay.metadata, "updated");
    assert_eq!(relay.state, PublicationState::Disabled);

    bot.stop_forwarding(&descriptor.id).await.unwrap();
    assert!(channel.publication(&relay.id).is_none());
    let err = bot.stop_forwarding(&descriptor.id).await.err().unwrap();
    assert!(matches!(err, ChannelError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_delayed_relay_visibility() {
    let engine = MemoryEngine::new();
    engine.set_relay_visibility(RelayVisibility::Delayed(Duration::from_millis(250)));
    let channel = engine.provider().create(None, None).await.unwrap();
    let alice = channel.join(MemberInit::default()).await.unwrap();
    let bot = channel.create_bot("sfu").await.unwrap();
    let origin = alice
        .publish(LocalStream::audio(), PublicationOptions::default())
        .await
        .unwrap();

    let descriptor = bot.start_forwarding(&origin.id, None).await.unwrap();
    assert!(channel
        .publication(&descriptor.relaying_publication_id)
        .is_none());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(channel
        .publication(&descriptor.relaying_publication_id)
        .is_some());
}

#[tokio::test]
async fn test_relay_subscriber_limit() {
    let engine = MemoryEngine::new();
    let a = engine.provider().create(Some("c"), None).await.unwrap();
    let alice = a.join(named("alice")).await.unwrap();
    let bot = a.create_bot("sfu").await.unwrap();
    let origin = alice
        .publish(LocalStream::audio(), PublicationOptions::default())
        .await
        .unwrap();
    let descriptor = bot.start_forwarding(&origin.id, Some(1)).await.unwrap();

    let b = engine.provider().find(Some("c"), None).await.unwrap();
    let bob = b.join(named("bob")).await.unwrap();
    let c = engine.provider().find(Some("c"), None).await.unwrap();
    let carol = c.join(named("carol")).await.unwrap();

    bob.subscribe(&descriptor.relaying_publication_id, SubscriptionOptions::default())
        .await
        .unwrap();
    let err = carol
        .subscribe(&descriptor.relaying_publication_id, SubscriptionOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChannelError::InvalidInput(_)));
}

#[tokio::test]
async fn test_native_failures_are_injectable() {
    let engine = MemoryEngine::new();
    let channel = engine.provider().create(None, None).await.unwrap();
    let alice = channel.join(MemberInit::default()).await.unwrap();
    let bot = channel.create_bot("sfu").await.unwrap();
    let origin = alice
        .publish(LocalStream::audio(), PublicationOptions::default())
        .await
        .unwrap();

    engine.set_fail_start_forwarding(true);
    let err = bot.start_forwarding(&origin.id, None).await.err().unwrap();
    assert!(matches!(err, ChannelError::Native(_)));
    assert!(!err.is_expected());

    engine.set_fail_start_forwarding(false);
    let descriptor = bot.start_forwarding(&origin.id, None).await.unwrap();
    engine.set_fail_stop_forwarding(true);
    assert!(bot.stop_forwarding(&descriptor.id).await.is_err());
}

#[tokio::test]
async fn test_disposed_handle_rejects_operations() {
    let channel = MemoryEngine::new()
        .provider()
        .create(None, None)
        .await
        .unwrap();
    let alice = channel.join(MemberInit::default()).await.unwrap();
    channel.dispose();
    assert!(channel.is_disposed());

    let err = alice
        .publish(LocalStream::audio(), PublicationOptions::default())
        .await
        .err()
        .unwrap();
    assert_eq!(err, ChannelError::Disposed);
}

#[tokio::test]
async fn test_close_blocks_joins() {
    let channel = MemoryEngine::new()
        .provider()
        .create(None, None)
        .await
        .unwrap();
    channel.close().await.unwrap();
    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(channel.join(MemberInit::default()).await.is_err());
}
