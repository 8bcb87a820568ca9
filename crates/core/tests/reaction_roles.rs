mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rolecall_core::{
    Bindings, BindingStore, ChannelId, EventRouter, InMemoryBindingStore, LiveIndex,
    MenuAdministration, MenuCollection, MenuKey, MessageId, ReactionDirection, ReactionEvent,
    ReactionSymbol, ReconcileOptions, Reconciler, RoleId, RouteOutcome, RouterOptions, RouterPool,
    UserId,
};
use rolecall_core::store::encode_menus;
use support::FakeGuild;

fn symbol(raw: &str) -> ReactionSymbol {
    ReactionSymbol::parse(raw).expect("symbol")
}

fn bindings(entries: &[(&str, u64)]) -> Bindings {
    entries.iter().map(|(raw, role)| (symbol(raw), RoleId(*role))).collect()
}

fn reaction(direction: ReactionDirection, key: MenuKey, user: u64, raw: &str) -> ReactionEvent {
    ReactionEvent {
        direction,
        channel_id: key.channel_id,
        message_id: key.message_id,
        actor_id: UserId(user),
        symbol: symbol(raw),
        is_bot: false,
    }
}

#[tokio::test]
async fn startup_skips_deleted_message_and_deleted_role() {
    let guild = Arc::new(FakeGuild {
        missing_messages: HashSet::from([20]),
        missing_roles: HashSet::from([302]),
        ..FakeGuild::default()
    });

    let mut persisted = MenuCollection::new();
    persisted.insert(MenuKey::new(ChannelId(1), MessageId(10)), bindings(&[("🔴", 101)]));
    persisted.insert(MenuKey::new(ChannelId(2), MessageId(20)), bindings(&[("🔵", 201)]));
    persisted.insert(
        MenuKey::new(ChannelId(3), MessageId(30)),
        bindings(&[("🍎", 301), ("🍐", 302)]),
    );
    let store = InMemoryBindingStore::with_menus(persisted.clone());

    let index = LiveIndex::new();
    let reconciler = Reconciler::new(guild, ReconcileOptions::default());
    let report = reconciler.reload_into(&store.load().await.expect("load"), &index).await;

    assert_eq!(index.len().await, 2);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.dropped_menus(), 1);
    assert_eq!(report.degraded_bindings(), 1);
    // A failed resolution never rewrites what is persisted.
    assert_eq!(store.load().await.expect("load"), persisted);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn repeated_add_changes_remote_state_once() {
    let guild = Arc::new(FakeGuild::default());
    let index = Arc::new(LiveIndex::new());
    let key = MenuKey::new(ChannelId(5), MessageId(6));

    let mut persisted = MenuCollection::new();
    persisted.insert(key, bindings(&[("🔥", 77)]));
    Reconciler::new(guild.clone(), ReconcileOptions::default()).reload_into(&persisted, &index).await;

    let router = EventRouter::new(index, guild.clone());
    for _ in 0..3 {
        let outcome = router.route(&reaction(ReactionDirection::Added, key, 9, "🔥")).await;
        assert!(matches!(outcome, RouteOutcome::Granted { .. }));
    }

    assert!(guild.holds(9, 77).await);
    assert_eq!(guild.change_count().await, 1);
}

#[tokio::test]
async fn remove_after_slow_add_leaves_role_revoked() {
    let guild = Arc::new(FakeGuild {
        grant_delay: Some(Duration::from_millis(40)),
        ..FakeGuild::default()
    });
    let index = Arc::new(LiveIndex::new());
    let key = MenuKey::new(ChannelId(5), MessageId(6));

    let mut persisted = MenuCollection::new();
    persisted.insert(key, bindings(&[("🔥", 77)]));
    Reconciler::new(guild.clone(), ReconcileOptions::default()).reload_into(&persisted, &index).await;

    let router = Arc::new(EventRouter::new(index, guild.clone()));
    let pool = RouterPool::spawn(router, RouterOptions { workers: 4, queue_capacity: 16 });
    pool.submit(reaction(ReactionDirection::Added, key, 9, "🔥")).await.expect("submit add");
    pool.submit(reaction(ReactionDirection::Removed, key, 9, "🔥")).await.expect("submit remove");
    pool.shutdown().await;

    assert!(!guild.holds(9, 77).await);
    assert_eq!(*guild.state_changes.lock().await, vec!["+9:77".to_owned(), "-9:77".to_owned()]);
}

#[tokio::test]
async fn colors_menu_end_to_end() {
    let guild = Arc::new(FakeGuild::default());
    let store = Arc::new(InMemoryBindingStore::new());
    let index = Arc::new(LiveIndex::new());
    let reconciler = Reconciler::new(guild.clone(), ReconcileOptions::default());
    let admin = MenuAdministration::new(store.clone(), index.clone(), guild.clone(), reconciler);

    let created = admin
        .create(ChannelId(10), "Colors", &[RoleId(111), RoleId(222)], &["🔴", "🔵"])
        .await
        .expect("menu created");
    let key = created.key;
    assert_eq!(key.channel_id, ChannelId(10));
    let persisted = store.load().await.expect("load");
    assert_eq!(persisted.get(&key), Some(&created.bindings));

    let document: serde_json::Value =
        serde_json::from_str(&encode_menus(&persisted).expect("encode")).expect("json");
    assert_eq!(
        document,
        serde_json::json!({ format!("10-{}", key.message_id): { "🔴": "111", "🔵": "222" } })
    );

    let router = EventRouter::new(index.clone(), guild.clone());
    router.route(&reaction(ReactionDirection::Added, key, 42, "🔴")).await;
    assert!(guild.holds(42, 111).await);
    assert!(!guild.holds(42, 222).await);

    router.route(&reaction(ReactionDirection::Removed, key, 42, "🔴")).await;
    assert!(!guild.holds(42, 111).await);

    admin.remove(key.channel_id, key.message_id).await.expect("menu removed");
    let after = router.route(&reaction(ReactionDirection::Added, key, 42, "🔴")).await;

    assert_eq!(after, RouteOutcome::NotAMenu);
    assert!(!guild.holds(42, 111).await);
    assert_eq!(*guild.deleted.lock().await, vec![(10, key.message_id.get())]);

    let remaining = store.load().await.expect("load");
    assert!(remaining.is_empty());
    let restarted = LiveIndex::new();
    let report = Reconciler::new(guild.clone(), ReconcileOptions::default())
        .reload_into(&remaining, &restarted)
        .await;
    assert!(!report.mentions(&key));
    assert_eq!(report.persisted, 0);
    assert!(restarted.is_empty().await);
}

#[tokio::test]
async fn created_menu_survives_a_restart() {
    let guild = Arc::new(FakeGuild::default());
    let store = Arc::new(InMemoryBindingStore::new());
    let admin = MenuAdministration::new(
        store.clone(),
        Arc::new(LiveIndex::new()),
        guild.clone(),
        Reconciler::new(guild.clone(), ReconcileOptions::default()),
    );
    let created = admin
        .create(ChannelId(10), "Games", &[RoleId(5)], &["<a:tetris:900>"])
        .await
        .expect("menu created");

    let fresh_index = LiveIndex::new();
    let report = Reconciler::new(guild, ReconcileOptions::default())
        .reload_into(&store.load().await.expect("load"), &fresh_index)
        .await;

    assert!(report.failures.is_empty());
    let menu = fresh_index
        .get(created.key.channel_id, created.key.message_id)
        .await
        .expect("menu restored");
    let role = menu.role_for(&symbol("<:tetris:900>")).expect("custom emoji normalized");
    assert_eq!(role.role_id, RoleId(5));
}
