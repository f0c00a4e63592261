//! Push delivery handling.

mod common;

use common::{eventually, Harness, START};
use meetsync_engine::{DeliveryOutcome, SyncConfig};
use meetsync_model::{Category, Entity, EntityKind, Meeting, Stakeholder, Timestamp};
use meetsync_testkit::{category, ids, meeting, meeting_with_audio, stakeholder, RecordBuilder};
use std::time::Duration;

#[test]
fn delivery_persists_and_publishes() {
    let h = Harness::new();
    let handler = h.engine.subscription_handler();

    let outcome = handler
        .on_delivery(vec![category("a", START, "A"), category("b", START, "B")])
        .unwrap();

    assert_eq!(outcome, DeliveryOutcome::Published { written: 2, live: 2 });
    assert_eq!(ids(&h.engine.records::<Category>()), vec!["a", "b"]);
    assert!(h.stored::<Category>("b").is_some());
}

#[test]
fn tombstone_persists_while_interaction_lock_held() {
    let h = Harness::new();
    h.seed_local(&[stakeholder("s1", START - 1_000, "Ada")]);
    h.engine.load().unwrap();
    let token = h.engine.locks().begin_interaction().unwrap();

    let tombstone = RecordBuilder::<Stakeholder>::new("s1")
        .updated(START)
        .deleted(START)
        .build();
    let outcome = h
        .engine
        .subscription_handler()
        .on_delivery(vec![tombstone.clone()])
        .unwrap();

    assert_eq!(outcome, DeliveryOutcome::Deferred { written: 1 });
    assert!(h.stored::<Stakeholder>("s1").unwrap().is_deleted());
    // The read model is intentionally left stale.
    assert_eq!(h.engine.records::<Stakeholder>().len(), 1);

    h.engine.locks().end_interaction(token);
    assert!(h.engine.records::<Stakeholder>().is_empty());
    let outcome = h
        .engine
        .subscription_handler()
        .on_delivery(vec![tombstone])
        .unwrap();
    assert_eq!(outcome, DeliveryOutcome::Published { written: 0, live: 0 });
    assert!(h.engine.records::<Stakeholder>().is_empty());
}

#[test]
fn sync_lock_also_defers_publishing() {
    let h = Harness::new();
    assert!(h.engine.locks().sync().acquire());

    let outcome = h
        .engine
        .subscription_handler()
        .on_delivery(vec![category("a", START, "A")])
        .unwrap();

    assert_eq!(outcome.written(), 1);
    assert!(matches!(outcome, DeliveryOutcome::Deferred { .. }));
    assert!(h.engine.records::<Category>().is_empty());
}

#[test]
fn deferred_delivery_is_published_when_interaction_ends() {
    let h = Harness::new();
    let mine = category("mine", START - 1_000, "Mine");
    h.seed_local(&[mine.clone()]);
    h.engine.load().unwrap();

    let token = h.engine.locks().begin_interaction().unwrap();
    let outcome = h
        .engine
        .subscription_handler()
        .on_delivery(vec![mine, category("theirs", START, "Theirs")])
        .unwrap();
    assert_eq!(outcome, DeliveryOutcome::Deferred { written: 1 });
    assert_eq!(ids(&h.engine.records::<Category>()), vec!["mine"]);

    h.engine.locks().end_interaction(token);
    assert_eq!(ids(&h.engine.records::<Category>()), vec!["mine", "theirs"]);
}

#[test]
fn deferred_delivery_is_published_after_delayed_release() {
    let h = Harness::with_config(
        SyncConfig::new().with_interaction_release_delay(Duration::from_millis(50)),
    );
    let token = h.engine.locks().begin_interaction().unwrap();
    h.engine
        .subscription_handler()
        .on_delivery(vec![meeting("m1", START, "Standup")])
        .unwrap();

    h.engine.locks().end_interaction(token);
    assert!(h.engine.records::<Meeting>().is_empty());
    assert!(eventually(|| h.engine.records::<Meeting>().len() == 1));
}

#[test]
fn deferred_delivery_is_published_when_sync_guard_drops() {
    let h = Harness::new();
    let guard = h.engine.locks().sync().guard().unwrap();
    h.engine
        .subscription_handler()
        .on_delivery(vec![category("a", START, "A")])
        .unwrap();
    assert!(h.engine.records::<Category>().is_empty());

    drop(guard);
    assert_eq!(ids(&h.engine.records::<Category>()), vec!["a"]);
}

#[test]
fn sync_reload_waits_for_settling_delete() {
    let h = Harness::new();
    h.seed_cloud(&[category("remote", START - 1_000, "Remote")]);
    let token = h.engine.locks().begin_interaction().unwrap();

    h.engine.full_sync().unwrap();
    assert!(h.stored::<Category>("remote").is_some());
    assert!(h.engine.records::<Category>().is_empty());

    h.engine.locks().end_interaction(token);
    assert_eq!(ids(&h.engine.records::<Category>()), vec!["remote"]);
}

#[test]
fn adds_racing_deliveries_stay_visible() {
    let h = Harness::new();
    let seed = category("seed", START - 1_000, "Seed");
    h.seed_local(&[seed.clone()]);
    h.engine.load().unwrap();

    let added: Vec<String> = std::thread::scope(|scope| {
        let adder = scope.spawn(|| {
            (0..100)
                .map(|_| {
                    let receipt = h
                        .engine
                        .mutations()
                        .add::<Category>(Default::default())
                        .unwrap();
                    receipt.record.id().to_string()
                })
                .collect()
        });
        for _ in 0..100 {
            h.engine
                .subscription_handler()
                .on_delivery(vec![seed.clone()])
                .unwrap();
        }
        adder.join().unwrap()
    });

    let visible = ids(&h.engine.records::<Category>());
    assert_eq!(visible.len(), added.len() + 1);
    for id in &added {
        assert!(visible.contains(id), "{id} vanished from the read model");
    }
}

#[test]
fn stale_delivery_does_not_clobber_newer_local_edit() {
    let h = Harness::new();
    h.seed_local(&[category("c1", START, "Local edit")]);
    h.engine.load().unwrap();

    h.engine
        .subscription_handler()
        .on_delivery(vec![category("c1", START - 5_000, "Old remote")])
        .unwrap();

    assert_eq!(h.stored::<Category>("c1").unwrap().fields().label, "Local edit");
    assert_eq!(
        h.engine.records::<Category>()[0].fields().label,
        "Local edit"
    );
}

#[test]
fn delivery_keeps_local_binaries() {
    let h = Harness::new();
    h.seed_local(&[meeting_with_audio("m1", START - 5_000, 128)]);
    h.engine.load().unwrap();

    h.engine
        .subscription_handler()
        .on_delivery(vec![meeting("m1", START, "Edited on phone")])
        .unwrap();

    let stored = h.stored::<Meeting>("m1").unwrap();
    assert_eq!(stored.fields().title, "Edited on phone");
    assert_eq!(stored.binary_len(), 128);
    assert_eq!(h.engine.records::<Meeting>()[0].binary_len(), 128);
}

#[test]
fn delivery_hides_deleted_records() {
    let h = Harness::new();
    h.seed_local(&[category("a", START, "A"), category("b", START, "B")]);
    h.engine.load().unwrap();

    let deleted_b = RecordBuilder::<Category>::new("b")
        .updated(START + 1)
        .deleted(START + 1)
        .build();
    h.engine
        .subscription_handler()
        .on_delivery(vec![category("a", START, "A"), deleted_b])
        .unwrap();

    assert_eq!(ids(&h.engine.records::<Category>()), vec!["a"]);
    assert_eq!(h.engine.local().get_all::<Category>().unwrap().len(), 2);
}

#[test]
fn subscriptions_follow_remote_changes() {
    let h = Harness::new();
    let subscriptions = h.engine.start_subscriptions().unwrap();
    assert_eq!(
        subscriptions.kinds(),
        vec![EntityKind::Meeting, EntityKind::Stakeholder, EntityKind::Category]
    );
    assert_eq!(h.cloud.subscriber_count(EntityKind::Category), 1);

    // Another device writes straight to the cloud.
    h.seed_cloud(&[category("remote", START, "From elsewhere")]);
    assert!(eventually(|| h.engine.records::<Category>().len() == 1));
    assert!(eventually(|| h.stored::<Category>("remote").is_some()));

    let mut gone = category("remote", START + 10, "From elsewhere");
    gone.meta_mut().mark_deleted(Timestamp::from_millis(START + 10));
    h.seed_cloud(&[gone]);
    assert!(eventually(|| h
        .stored::<Category>("remote")
        .is_some_and(|c| c.is_deleted())));
    assert!(eventually(|| h.engine.records::<Category>().is_empty()));

    subscriptions.stop();
    assert_eq!(h.cloud.subscriber_count(EntityKind::Category), 0);
}

#[test]
fn dropping_subscription_set_unsubscribes() {
    let h = Harness::new();
    {
        let _subscriptions = h.engine.start_subscriptions().unwrap();
        assert_eq!(h.cloud.subscriber_count(EntityKind::Meeting), 1);
    }
    assert_eq!(h.cloud.subscriber_count(EntityKind::Meeting), 0);
}

#[test]
fn subscribing_offline_fails() {
    let h = Harness::new();
    h.cloud.set_online(false);
    assert!(h.engine.start_subscriptions().is_err());
    assert_eq!(h.cloud.subscriber_count(EntityKind::Meeting), 0);
}

#[test]
fn delivery_during_delete_settle_does_not_resurrect() {
    let h = Harness::with_config(
        SyncConfig::new().with_interaction_release_delay(Duration::from_millis(200)),
    );
    let receipt = h
        .engine
        .mutations()
        .add::<Category>(Default::default())
        .unwrap();
    let id = receipt.record.id().clone();
    h.engine.mutations().soft_delete::<Category>(&id).unwrap();
    assert!(h.engine.locks().interaction().is_held());

    // A delivery computed before the delete still shows the live copy.
    let outcome = h
        .engine
        .subscription_handler()
        .on_delivery(vec![receipt.record.clone()])
        .unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Deferred { .. }));
    assert!(h.engine.records::<Category>().is_empty());
    assert!(h
        .engine
        .local()
        .get::<Category>(&id)
        .unwrap()
        .unwrap()
        .is_deleted());

    assert!(eventually(|| !h.engine.locks().interaction().is_held()));
}
