use esactor_domain::value_object::{AggregateId, AggregateVersion, CorrelationId};
use esactor_macros::aggregate_event;
use serde::{Deserialize, Serialize};

#[aggregate_event]
#[derive(Debug, Clone, Serialize, Deserialize)]
enum ShelfEvent {
    Stocked {
        aggregate_id: AggregateId,
        aggregate_version: AggregateVersion,
        correlation_id: CorrelationId,
        sku: String,
    },
    Emptied {
        sku: String,
    },
}

fn main() {}
