use esactor_domain::message::AggregateEvent;
use esactor_macros::aggregate_event;

#[aggregate_event]
enum LedgerEvent {
    Opened { owner: String },
    #[event(event_type = "ledger.credited")]
    Credited { amount: u64 },
}

fn main() {
    assert_eq!(
        LedgerEvent::EVENT_TYPES,
        &["LedgerEvent.Opened", "ledger.credited"]
    );
}
