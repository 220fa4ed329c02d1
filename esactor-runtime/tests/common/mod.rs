#![allow(dead_code)]

use async_trait::async_trait;
use esactor_domain::error::{DomainError, DomainResult};
use esactor_domain::message::{AggregateCommand as _, AggregateSnapshot};
use esactor_domain::persist::{EventStore, InMemoryEventStore, SerializedEvent, SerializedSnapshot};
use esactor_domain::value_object::{AggregateId, AggregateVersion, CorrelationId};
use esactor_macros::{AggregateCommand, Message, aggregate_event};
use esactor_runtime::{CommandFailure, EventSourcedAggregate, EventSourcingDelegate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[aggregate_event]
pub enum CounterEvent {
    Opened { name: String },
    Incremented { by: i64 },
}

#[derive(Debug, Message, AggregateCommand)]
pub enum CounterCommand {
    #[command(creation)]
    Open {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        name: String,
    },
    Increment {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        by: i64,
    },
}

impl CounterCommand {
    pub fn open(aggregate_id: AggregateId, name: &str) -> Self {
        CounterCommand::Open {
            aggregate_id,
            correlation_id: CorrelationId::new(),
            name: name.to_string(),
        }
    }

    pub fn increment(aggregate_id: AggregateId, by: i64) -> Self {
        CounterCommand::Increment {
            aggregate_id,
            correlation_id: CorrelationId::new(),
            by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub aggregate_id: AggregateId,
    pub aggregate_version: AggregateVersion,
    pub name: String,
    pub value: i64,
}

impl AggregateSnapshot for CounterSnapshot {
    const SNAPSHOT_TYPE: &'static str = "CounterSnapshot";

    fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    fn aggregate_version(&self) -> AggregateVersion {
        self.aggregate_version
    }
}

pub struct Counter {
    id: AggregateId,
    version: AggregateVersion,
    name: String,
    value: i64,
}

impl EventSourcedAggregate for Counter {
    const TYPE: &'static str = "counter";

    type Command = CounterCommand;
    type Event = CounterEvent;
    type Snapshot = CounterSnapshot;

    fn new(aggregate_id: AggregateId) -> Self {
        Self {
            id: aggregate_id,
            version: AggregateVersion::INITIAL,
            name: String::new(),
            value: 0,
        }
    }

    fn apply_event(&mut self, event: &CounterEvent) {
        match event {
            CounterEvent::Opened {
                name,
                aggregate_version,
                ..
            } => {
                self.name = name.clone();
                self.version = *aggregate_version;
            }
            CounterEvent::Incremented {
                by,
                aggregate_version,
                ..
            } => {
                self.value += by;
                self.version = *aggregate_version;
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: CounterSnapshot) {
        self.name = snapshot.name;
        self.value = snapshot.value;
        self.version = snapshot.aggregate_version;
    }

    fn handle(
        &self,
        command: CounterCommand,
        delegate: &mut EventSourcingDelegate,
    ) -> Result<Vec<CounterEvent>, CommandFailure> {
        let version = if command.is_creation() {
            delegate.first_version(&command)?
        } else {
            delegate.next_version(&command)?
        };
        match command {
            CounterCommand::Open {
                aggregate_id,
                correlation_id,
                name,
            } => Ok(vec![CounterEvent::Opened {
                aggregate_id,
                aggregate_version: version,
                correlation_id,
                name,
            }]),
            CounterCommand::Increment {
                aggregate_id,
                correlation_id,
                by,
            } => {
                if by <= 0 {
                    return Err(CommandFailure::validation(["increment must be positive"]));
                }
                Ok(vec![CounterEvent::Incremented {
                    aggregate_id,
                    aggregate_version: version,
                    correlation_id,
                    by,
                }])
            }
        }
    }

    fn snapshot(&self) -> Option<CounterSnapshot> {
        Some(CounterSnapshot {
            aggregate_id: self.id,
            aggregate_version: self.version,
            name: self.name.clone(),
            value: self.value,
        })
    }
}

pub fn opened(id: AggregateId, version: i64, name: &str) -> CounterEvent {
    CounterEvent::Opened {
        aggregate_id: id,
        aggregate_version: AggregateVersion::from_value(version),
        correlation_id: CorrelationId::new(),
        name: name.to_string(),
    }
}

pub fn incremented(id: AggregateId, version: i64, by: i64) -> CounterEvent {
    CounterEvent::Incremented {
        aggregate_id: id,
        aggregate_version: AggregateVersion::from_value(version),
        correlation_id: CorrelationId::new(),
        by,
    }
}

/// 记录调用次数、可注入故障与延迟的存储
#[derive(Clone, Default)]
pub struct ProbeStore {
    pub inner: InMemoryEventStore,
    pub snapshot_loads: Arc<AtomicUsize>,
    pub event_loads: Arc<AtomicUsize>,
    pub fail_loads: Arc<AtomicBool>,
    pub fail_appends: Arc<AtomicBool>,
    pub load_delay_ms: Arc<AtomicUsize>,
    pub append_delay_ms: Arc<AtomicUsize>,
}

impl ProbeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> usize {
        self.snapshot_loads.load(Ordering::SeqCst)
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.load_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn set_append_delay(&self, delay: Duration) {
        self.append_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for ProbeStore {
    async fn load_latest_snapshot(
        &self,
        aggregate_id: AggregateId,
    ) -> DomainResult<Option<SerializedSnapshot>> {
        self.snapshot_loads.fetch_add(1, Ordering::SeqCst);
        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(DomainError::Database {
                reason: "snapshot table unavailable".into(),
            });
        }
        self.inner.load_latest_snapshot(aggregate_id).await
    }

    async fn load_events(
        &self,
        aggregate_id: AggregateId,
        from_version: AggregateVersion,
    ) -> DomainResult<Vec<SerializedEvent>> {
        self.event_loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_events(aggregate_id, from_version).await
    }

    async fn append_events(
        &self,
        aggregate_id: AggregateId,
        events: Vec<SerializedEvent>,
    ) -> DomainResult<usize> {
        let delay = self.append_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(DomainError::Database {
                reason: "connection reset".into(),
            });
        }
        self.inner.append_events(aggregate_id, events).await
    }

    async fn append_snapshot(&self, snapshot: SerializedSnapshot) -> DomainResult<usize> {
        self.inner.append_snapshot(snapshot).await
    }
}

/// 轮询直到条件成立（至多 2 秒）
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// 直接写入已存在的历史
pub async fn seed(store: &InMemoryEventStore, id: AggregateId, events: &[CounterEvent]) {
    let serialized = esactor_domain::persist::serialize_events(Counter::TYPE, events)
        .expect("serialize seed events");
    store
        .append_events(id, serialized)
        .await
        .expect("append seed events");
}
