use esactor_domain::eventing::{EventBus, InMemoryEventBus};
use esactor_domain::message::AggregateSnapshot;
use esactor_domain::persist::{InMemoryEventStore, SnapshotPolicy};
use esactor_domain::value_object::{AggregateId, AggregateVersion, CorrelationId};
use esactor_macros::{AggregateCommand, Message, aggregate_event};
use esactor_runtime::{
    AggregateRuntime, CommandFailure, EventSourcedAggregate, EventSourcingDelegate, RuntimeConfig,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum AccountError {
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("insufficient funds: balance={balance}, requested={requested}")]
    InsufficientFunds { balance: i64, requested: i64 },
}

impl From<AccountError> for CommandFailure {
    fn from(err: AccountError) -> Self {
        CommandFailure::validation([err.to_string()])
    }
}

#[derive(Debug, Message, AggregateCommand)]
#[message(address = "demo.account")]
enum AccountCommand {
    #[command(creation)]
    Open {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        initial_balance: i64,
    },
    Deposit {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        amount: i64,
    },
    Withdraw {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        amount: i64,
    },
}

#[aggregate_event]
enum AccountEvent {
    #[event(event_type = "account.opened")]
    Opened { initial_balance: i64 },
    #[event(event_type = "account.deposited")]
    Deposited { amount: i64 },
    #[event(event_type = "account.withdrawn")]
    Withdrawn { amount: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountSnapshot {
    aggregate_id: AggregateId,
    aggregate_version: AggregateVersion,
    balance: i64,
}

impl AggregateSnapshot for AccountSnapshot {
    const SNAPSHOT_TYPE: &'static str = "account.snapshot";

    fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    fn aggregate_version(&self) -> AggregateVersion {
        self.aggregate_version
    }
}

struct Account {
    id: AggregateId,
    version: AggregateVersion,
    balance: i64,
}

impl EventSourcedAggregate for Account {
    const TYPE: &'static str = "account";

    type Command = AccountCommand;
    type Event = AccountEvent;
    type Snapshot = AccountSnapshot;

    fn new(aggregate_id: AggregateId) -> Self {
        Self {
            id: aggregate_id,
            version: AggregateVersion::INITIAL,
            balance: 0,
        }
    }

    fn apply_event(&mut self, event: &AccountEvent) {
        match event {
            AccountEvent::Opened {
                aggregate_version,
                initial_balance,
                ..
            } => {
                self.balance = *initial_balance;
                self.version = *aggregate_version;
            }
            AccountEvent::Deposited {
                aggregate_version,
                amount,
                ..
            } => {
                self.balance += *amount;
                self.version = *aggregate_version;
            }
            AccountEvent::Withdrawn {
                aggregate_version,
                amount,
                ..
            } => {
                self.balance -= *amount;
                self.version = *aggregate_version;
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: AccountSnapshot) {
        self.balance = snapshot.balance;
        self.version = snapshot.aggregate_version;
    }

    fn handle(
        &self,
        command: AccountCommand,
        delegate: &mut EventSourcingDelegate,
    ) -> Result<Vec<AccountEvent>, CommandFailure> {
        match command {
            AccountCommand::Open {
                aggregate_id,
                correlation_id,
                initial_balance,
            } => {
                let aggregate_version = delegate.first_version(&command)?;
                Ok(vec![AccountEvent::Opened {
                    aggregate_id,
                    aggregate_version,
                    correlation_id,
                    initial_balance,
                }])
            }
            AccountCommand::Deposit { amount, .. } if amount <= 0 => {
                Err(AccountError::NonPositiveAmount.into())
            }
            AccountCommand::Deposit {
                aggregate_id,
                correlation_id,
                amount,
            } => {
                let aggregate_version = delegate.next_version(&command)?;
                Ok(vec![AccountEvent::Deposited {
                    aggregate_id,
                    aggregate_version,
                    correlation_id,
                    amount,
                }])
            }
            AccountCommand::Withdraw { amount, .. } if amount > self.balance => {
                Err(AccountError::InsufficientFunds {
                    balance: self.balance,
                    requested: amount,
                }
                .into())
            }
            AccountCommand::Withdraw {
                aggregate_id,
                correlation_id,
                amount,
            } => {
                let aggregate_version = delegate.next_version(&command)?;
                Ok(vec![AccountEvent::Withdrawn {
                    aggregate_id,
                    aggregate_version,
                    correlation_id,
                    amount,
                }])
            }
        }
    }

    fn snapshot(&self) -> Option<AccountSnapshot> {
        Some(AccountSnapshot {
            aggregate_id: self.id,
            aggregate_version: self.version,
            balance: self.balance,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RuntimeConfig::builder()
        .node_id("demo")
        .snapshot_policy(SnapshotPolicy::Every(2))
        .build();
    let store = InMemoryEventStore::new();
    let events = Arc::new(InMemoryEventBus::default());

    let mut feed = events.subscribe().await;
    tokio::spawn(async move {
        while let Some(Ok(event)) = feed.next().await {
            println!(
                "  event {} v{} ({})",
                event.event_type(),
                event.aggregate_version().value(),
                event.aggregate_id()
            );
        }
    });

    let runtime = AggregateRuntime::start(config, Arc::new(store.clone()), events);
    runtime.register_aggregate::<Account>();

    let id = AggregateId::new();
    let commands = vec![
        AccountCommand::Open {
            aggregate_id: id,
            correlation_id: CorrelationId::new(),
            initial_balance: 100,
        },
        AccountCommand::Deposit {
            aggregate_id: id,
            correlation_id: CorrelationId::new(),
            amount: 50,
        },
        AccountCommand::Withdraw {
            aggregate_id: id,
            correlation_id: CorrelationId::new(),
            amount: 500,
        },
        AccountCommand::Withdraw {
            aggregate_id: id,
            correlation_id: CorrelationId::new(),
            amount: 30,
        },
    ];

    for command in commands {
        match runtime.send_command(command).await {
            Ok(ack) => println!("ok: {} now at {}", ack.aggregate_id, ack.version),
            Err(err) => println!("rejected: {err}"),
        }
    }

    println!("stored {} events for {id}", store.event_count(id).await);
    runtime.shutdown();
    Ok(())
}
