use esactor_domain::message::AggregateCommand;
use esactor_domain::value_object::{AggregateId, CorrelationId};
use esactor_macros::{AggregateCommand, Message};

#[derive(Message, AggregateCommand)]
enum ShelfCommand {
    #[command(creation)]
    Install {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
    },
    Stock {
        aggregate_id: AggregateId,
        correlation_id: CorrelationId,
        sku: String,
    },
}

#[derive(Message, AggregateCommand)]
#[command(creation)]
struct CreateShelf {
    aggregate_id: AggregateId,
    correlation_id: CorrelationId,
}

fn main() {
    let id = AggregateId::new();
    let install = ShelfCommand::Install {
        aggregate_id: id,
        correlation_id: CorrelationId::new(),
    };
    assert!(install.is_creation());
    assert_eq!(install.aggregate_id(), id);
    assert_eq!(install.command_name(), "ShelfCommand.Install");

    let create = CreateShelf {
        aggregate_id: id,
        correlation_id: CorrelationId::new(),
    };
    assert!(create.is_creation());
    assert_eq!(create.command_name(), "CreateShelf");
}
