mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use event_scheduler::scheduling::event::{Event, EventStatus, EventType};
use event_scheduler::scheduling::store::{EventStore, PostgresEventStore};
use uuid::Uuid;

fn pending_event(user_id: Uuid, target: chrono::DateTime<Utc>) -> Event {
    Event::builder()
        .user_id(user_id)
        .event_type(EventType::Birthday)
        .target_timestamp_utc(target)
        .target_timestamp_local(target)
        .target_timezone("UTC".to_string())
        .idempotency_key(Event::derive_idempotency_key(user_id, target, EventType::Birthday))
        .build()
}

#[tokio::test(flavor = "multi_thread")]
async fn claim_exclusivity_across_concurrent_claimers() {
    let (pool, _container) = common::test_pool().await;
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool));

    let now = Utc::now();
    let mut ids = Vec::new();
    for i in 0..20 {
        let e = pending_event(Uuid::new_v4(), now - Duration::seconds(i));
        let created = store.create(e).await.unwrap();
        ids.push(created.id);
    }

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move { store.claim_ready_events(5).await.unwrap() }));
    }

    let mut claimed_ids = Vec::new();
    for task in tasks {
        let claimed = task.await.unwrap();
        for event in claimed {
            assert_eq!(event.status, EventStatus::Processing);
            claimed_ids.push(event.id);
        }
    }

    claimed_ids.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(claimed_ids, expected, "union of claims must equal the ready set with no duplicates");
}

#[tokio::test]
async fn claim_ordering_is_ascending_by_target_timestamp() {
    let (pool, _container) = common::test_pool().await;
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool));

    let now = Utc::now();
    let user = Uuid::new_v4();
    let later = store.create(pending_event(user, now - Duration::seconds(1))).await.unwrap();
    let earlier = store
        .create(pending_event(Uuid::new_v4(), now - Duration::seconds(10)))
        .await
        .unwrap();

    let claimed = store.claim_ready_events(10).await.unwrap();
    let positions: Vec<Uuid> = claimed.iter().map(|e| e.id).collect();
    let earlier_pos = positions.iter().position(|id| *id == earlier.id).unwrap();
    let later_pos = positions.iter().position(|id| *id == later.id).unwrap();
    assert!(earlier_pos < later_pos);
}

#[tokio::test]
async fn optimistic_lock_exclusivity() {
    let (pool, _container) = common::test_pool().await;
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool));

    let now = Utc::now();
    let created = store.create(pending_event(Uuid::new_v4(), now)).await.unwrap();
    let claimed = store.claim_ready_events(1).await.unwrap();
    let loaded = claimed.into_iter().find(|e| e.id == created.id).unwrap();

    let attempt_a = loaded.mark_completed(now).unwrap();
    let attempt_b = loaded.mark_failed(now, "boom").unwrap();

    let result_a = store.update(attempt_a).await;
    let result_b = store.update(attempt_b).await;

    assert!(result_a.is_ok() ^ result_b.is_ok(), "exactly one concurrent update must succeed");

    let final_state = store.find_by_id(created.id).await.unwrap().unwrap();
    assert!(matches!(final_state.status, EventStatus::Completed | EventStatus::Failed));
}

#[tokio::test]
async fn cascade_delete_removes_all_events_for_user() {
    let (pool, _container) = common::test_pool().await;
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool));

    let user = Uuid::new_v4();
    let now = Utc::now();
    store.create(pending_event(user, now)).await.unwrap();
    store.create(pending_event(user, now + Duration::days(365))).await.unwrap();

    let deleted = store.delete_by_user_id(user).await.unwrap();
    assert_eq!(deleted, 2);
    assert!(store.find_by_user_id(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn find_missed_events_does_not_mutate_status() {
    let (pool, _container) = common::test_pool().await;
    let store: Arc<dyn EventStore> = Arc::new(PostgresEventStore::new(pool));

    let now = Utc::now();
    let created = store
        .create(pending_event(Uuid::new_v4(), now - Duration::minutes(5)))
        .await
        .unwrap();

    let first = store.find_missed_events(100).await.unwrap();
    let second = store.find_missed_events(100).await.unwrap();
    assert_eq!(first.len(), second.len());
    assert!(first.iter().any(|e| e.id == created.id));

    let reloaded = store.find_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(reloaded.status, EventStatus::Pending);
}
