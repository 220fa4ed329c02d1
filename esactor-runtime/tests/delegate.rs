mod common;

use anyhow::Result as AnyResult;
use common::{CounterCommand, CounterEvent, ProbeStore, incremented, opened};
use esactor_domain::eventing::{EventBus, EventPublisher, InMemoryEventBus};
use esactor_domain::message::ErrorEvent;
use esactor_domain::persist::{EventStore, InMemoryEventStore, deserialize_events};
use esactor_domain::value_object::{AggregateId, AggregateVersion, CorrelationId};
use esactor_runtime::{CommandFailure, EventSourcingDelegate};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn delegate_with(
    id: AggregateId,
    store: Arc<dyn EventStore>,
    bus: Arc<InMemoryEventBus>,
) -> EventSourcingDelegate {
    EventSourcingDelegate::new(id, "counter", store, EventPublisher::new(bus))
}

#[tokio::test]
async fn first_version_twice_is_rejected_and_keeps_version() {
    let id = AggregateId::new();
    let mut delegate = delegate_with(
        id,
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::default()),
    );
    let open = CounterCommand::open(id, "first");

    let v1 = delegate.first_version(&open).unwrap();
    assert_eq!(v1, AggregateVersion::from_value(1));

    let err = delegate.first_version(&open).unwrap_err();
    assert!(matches!(
        err,
        ErrorEvent::AttemptToInitializeAlreadyInitialized { aggregate_id, .. } if aggregate_id == id
    ));
    assert_eq!(delegate.version().value(), 1);
}

#[tokio::test]
async fn next_version_on_uninitialized_aggregate_is_rejected() {
    let id = AggregateId::new();
    let mut delegate = delegate_with(
        id,
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::default()),
    );

    let err = delegate
        .next_version(&CounterCommand::increment(id, 1))
        .unwrap_err();
    match err {
        ErrorEvent::AttemptToSendCommandToUninitialized { command, .. } => {
            assert_eq!(command, "CounterCommand.Increment");
        }
        other => panic!("unexpected error event: {other:?}"),
    }
    assert!(delegate.version().is_initial());
    assert!(!delegate.is_initialized());
}

#[tokio::test]
async fn stored_events_load_back_in_order_and_are_published() -> AnyResult<()> {
    let id = AggregateId::new();
    let store = InMemoryEventStore::new();
    let bus = Arc::new(InMemoryEventBus::default());
    let mut published = bus.subscribe().await;
    let mut delegate = delegate_with(id, Arc::new(store.clone()), bus.clone());

    delegate.first_version(&CounterCommand::open(id, "c"))?;
    delegate.next_version(&CounterCommand::increment(id, 3))?;
    let e1 = opened(id, 1, "c");
    let e2 = incremented(id, 2, 3);
    delegate
        .store_and_publish_events(&[e1.clone(), e2.clone()], CorrelationId::new())
        .await?;

    let loaded = store.load_events(id, AggregateVersion::from_value(1)).await?;
    let loaded: Vec<CounterEvent> = deserialize_events(&loaded)?;
    assert_eq!(loaded, vec![e1, e2]);

    let first = published.next().await.expect("first event")?;
    let second = published.next().await.expect("second event")?;
    assert_eq!(first.event_type(), "CounterEvent.Opened");
    assert_eq!(second.aggregate_version().value(), 2);
    Ok(())
}

#[tokio::test]
async fn append_failure_publishes_nothing() -> AnyResult<()> {
    let id = AggregateId::new();
    let store = ProbeStore::new();
    store.set_fail_appends(true);
    let bus = Arc::new(InMemoryEventBus::default());
    let mut published = bus.subscribe().await;
    let mut delegate = delegate_with(id, Arc::new(store.clone()), bus.clone());

    delegate.first_version(&CounterCommand::open(id, "c"))?;
    let correlation_id = CorrelationId::new();
    let err = delegate
        .store_and_publish_events(&[opened(id, 1, "c")], correlation_id)
        .await
        .unwrap_err();

    match err {
        CommandFailure::UnableToStoreAggregateEvents {
            aggregate_id,
            correlation_id: corr,
            event_count,
            ..
        } => {
            assert_eq!(aggregate_id, id);
            assert_eq!(corr, correlation_id);
            assert_eq!(event_count, 1);
        }
        other => panic!("unexpected failure: {other:?}"),
    }
    assert!(
        tokio::time::timeout(Duration::from_millis(50), published.next())
            .await
            .is_err()
    );
    assert_eq!(store.inner.event_count(id).await, 0);
    Ok(())
}

#[tokio::test]
async fn version_guard_failure_is_published_as_error_event() -> AnyResult<()> {
    let id = AggregateId::new();
    let bus = Arc::new(InMemoryEventBus::default());
    let mut errors = bus
        .subscribe_to(&["ErrorEvent.AttemptToSendCommandToUninitialized"])
        .await;
    let mut delegate = delegate_with(id, Arc::new(InMemoryEventStore::new()), bus.clone());

    let err = delegate
        .next_version(&CounterCommand::increment(id, 1))
        .unwrap_err();
    delegate.fail(&err).await;

    let event = errors.next().await.expect("error event")?;
    assert_eq!(event.aggregate_id(), id);
    assert_eq!(event.aggregate_type(), "counter");
    let back: ErrorEvent = serde_json::from_value(event.payload().clone())?;
    assert_eq!(back, err);
    Ok(())
}
