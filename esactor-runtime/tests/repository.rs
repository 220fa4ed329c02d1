mod common;

use anyhow::Result as AnyResult;
use common::{
    Counter, CounterCommand, CounterSnapshot, ProbeStore, eventually, incremented, opened, seed,
};
use esactor_domain::address::DefaultAggregateAddressStrategy;
use esactor_domain::eventing::{EventPublisher, InMemoryEventBus};
use esactor_domain::message::Message;
use esactor_domain::persist::{EventStore, SerializedSnapshot};
use esactor_domain::value_object::{AggregateId, AggregateVersion, CorrelationId};
use esactor_runtime::bus::{CommandRegistrar, CommandSender, Mailbox, MessageBus};
use esactor_runtime::messages::{ApplySnapshotAndEvents, ReplayResult};
use esactor_runtime::{
    ActorContext, AggregateDirectory, AggregateInstance, AggregateRepository, CommandFailure,
    DeliveryOptions, EventSourcedAggregate, LoadOutcome, aggregate_factory, register_aggregate,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

struct Fixture {
    store: ProbeStore,
    directory: Arc<AggregateDirectory>,
    repository: Arc<AggregateRepository>,
}

fn fixture(max_cached_aggregates: usize) -> Fixture {
    let store = ProbeStore::new();
    let bus = MessageBus::new("test-node");
    let directory = Arc::new(AggregateDirectory::new());
    let repository = AggregateRepository::builder()
        .directory(directory.clone())
        .strategy(Arc::new(DefaultAggregateAddressStrategy::new()))
        .store(Arc::new(store.clone()))
        .publisher(EventPublisher::new(Arc::new(InMemoryEventBus::default())))
        .registrar(CommandRegistrar::new(bus.clone()))
        .sender(CommandSender::new(bus, DeliveryOptions::default()))
        .max_cached_aggregates(max_cached_aggregates)
        .build();
    Fixture {
        store,
        directory,
        repository: Arc::new(repository),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_loads_read_storage_and_deploy_once() -> AnyResult<()> {
    let fx = fixture(16);
    let deployments = Arc::new(AtomicUsize::new(0));
    let inner = aggregate_factory::<Counter>();
    let counted = deployments.clone();
    fx.directory.register_factory(
        "CounterEvent.Opened",
        Counter::TYPE,
        Arc::new(move |id: AggregateId| {
            counted.fetch_add(1, Ordering::SeqCst);
            inner(id)
        }),
    );

    let id = AggregateId::new();
    seed(&fx.store.inner, id, &[opened(id, 1, "shared")]).await;
    fx.store.set_load_delay(Duration::from_millis(20));

    let mut set = JoinSet::new();
    for _ in 0..16 {
        let repository = fx.repository.clone();
        let directory = fx.directory.clone();
        set.spawn(async move {
            let outcome = repository.ensure_loaded(id, CorrelationId::new()).await;
            (outcome, directory.is_deployed(id))
        });
    }

    let mut loaded = 0;
    while let Some(joined) = set.join_next().await {
        let (outcome, deployed) = joined?;
        assert!(deployed);
        match outcome? {
            LoadOutcome::Loaded { version } => {
                assert_eq!(version.value(), 1);
                loaded += 1;
            }
            LoadOutcome::Resident => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(loaded, 1);
    assert_eq!(fx.store.loads(), 1);
    assert_eq!(deployments.load(Ordering::SeqCst), 1);
    assert!(fx.repository.locks().is_empty());
    Ok(())
}

/// 只记录收到的重放消息
struct ReplayProbe {
    seen: Arc<Mutex<Option<ApplySnapshotAndEvents>>>,
}

impl AggregateInstance for ReplayProbe {
    fn aggregate_type(&self) -> &'static str {
        "probe"
    }

    fn start(self: Box<Self>, mut mailbox: Mailbox, _context: ActorContext) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = mailbox.recv().await {
                let Ok(delivery) = envelope.downcast::<ApplySnapshotAndEvents>() else {
                    continue;
                };
                let (message, reply) = delivery.into_parts();
                let version = message
                    .events
                    .last()
                    .map(|e| e.aggregate_version())
                    .or_else(|| message.snapshot.as_ref().map(|s| s.aggregate_version()))
                    .unwrap_or_default();
                *self.seen.lock().unwrap() = Some(message);
                reply.reply::<ReplayResult>(Ok(version));
            }
        })
    }
}

#[tokio::test]
async fn snapshot_bounds_the_replayed_events() -> AnyResult<()> {
    let fx = fixture(16);
    let seen = Arc::new(Mutex::new(None));
    let probe_seen = seen.clone();
    fx.directory.register_factory(
        "CounterSnapshot",
        "probe",
        Arc::new(move |_id: AggregateId| -> Box<dyn AggregateInstance> {
            Box::new(ReplayProbe {
                seen: probe_seen.clone(),
            })
        }),
    );

    let id = AggregateId::new();
    let mut history = vec![opened(id, 1, "snap")];
    history.extend((2..=7).map(|v| incremented(id, v, 1)));
    seed(&fx.store.inner, id, &history).await;
    let snapshot = CounterSnapshot {
        aggregate_id: id,
        aggregate_version: AggregateVersion::from_value(5),
        name: "snap".into(),
        value: 4,
    };
    fx.store
        .inner
        .append_snapshot(SerializedSnapshot::from_snapshot(Counter::TYPE, &snapshot)?)
        .await?;

    let outcome = fx.repository.ensure_loaded(id, CorrelationId::new()).await?;
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            version: AggregateVersion::from_value(7)
        }
    );

    let message = seen.lock().unwrap().take().expect("replay delivered");
    let delivered = message.snapshot.expect("snapshot delivered");
    assert_eq!(delivered.aggregate_version().value(), 5);
    assert_eq!(delivered.snapshot_type(), "CounterSnapshot");
    let versions: Vec<i64> = message
        .events
        .iter()
        .map(|e| e.aggregate_version().value())
        .collect();
    assert_eq!(versions, vec![6, 7]);
    Ok(())
}

#[tokio::test]
async fn lock_is_released_when_storage_load_fails() -> AnyResult<()> {
    let fx = fixture(16);
    register_aggregate::<Counter>(&fx.directory);
    let id = AggregateId::new();
    seed(&fx.store.inner, id, &[opened(id, 1, "flaky")]).await;

    fx.store.set_fail_loads(true);
    let err = fx
        .repository
        .ensure_loaded(id, CorrelationId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CommandFailure::Storage { aggregate_id, .. } if aggregate_id == id));
    assert!(fx.repository.locks().is_empty());
    assert!(!fx.directory.is_deployed(id));

    fx.store.set_fail_loads(false);
    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        fx.repository.ensure_loaded(id, CorrelationId::new()),
    )
    .await??;
    assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
    assert!(fx.directory.is_deployed(id));
    Ok(())
}

#[tokio::test]
async fn aggregates_without_history_need_a_creation_type() -> AnyResult<()> {
    let fx = fixture(16);
    register_aggregate::<Counter>(&fx.directory);
    let id = AggregateId::new();

    let outcome = fx.repository.ensure_loaded(id, CorrelationId::new()).await?;
    assert_eq!(outcome, LoadOutcome::NeverExisted);
    assert!(!outcome.is_deployed());
    assert!(!fx.directory.is_deployed(id));

    let outcome = fx
        .repository
        .ensure_loaded_or_create(id, CounterCommand::ADDRESS, CorrelationId::new())
        .await?;
    assert_eq!(outcome, LoadOutcome::Created);
    assert!(fx.directory.is_deployed(id));
    assert_eq!(
        fx.directory.address_of(id),
        Some(id.to_string_fast())
    );
    Ok(())
}

#[tokio::test]
async fn unknown_persisted_type_has_no_factory() {
    let fx = fixture(16);
    let id = AggregateId::new();
    seed(&fx.store.inner, id, &[opened(id, 1, "orphan")]).await;

    let err = fx
        .repository
        .ensure_loaded(id, CorrelationId::new())
        .await
        .unwrap_err();
    match err {
        CommandFailure::UnableToFindAggregateFactory {
            aggregate_id,
            persisted_type,
        } => {
            assert_eq!(aggregate_id, id);
            assert_eq!(persisted_type, "CounterEvent.Opened");
        }
        other => panic!("unexpected failure: {other:?}"),
    }
    assert!(fx.repository.locks().is_empty());
}

#[tokio::test]
async fn least_recently_used_aggregate_is_unloaded() -> AnyResult<()> {
    let fx = fixture(2);
    register_aggregate::<Counter>(&fx.directory);
    let ids: Vec<AggregateId> = (0..3).map(|_| AggregateId::new()).collect();
    for id in &ids {
        seed(&fx.store.inner, *id, &[opened(*id, 1, "lru")]).await;
    }

    for id in &ids {
        fx.repository.ensure_loaded(*id, CorrelationId::new()).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let directory = fx.directory.clone();
    let first = ids[0];
    assert!(eventually(|| !directory.is_deployed(first)).await);
    assert!(fx.directory.is_deployed(ids[1]));
    assert!(fx.directory.is_deployed(ids[2]));
    assert_eq!(fx.directory.resident_count(), 2);

    let outcome = fx.repository.ensure_loaded(first, CorrelationId::new()).await?;
    assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
    Ok(())
}
