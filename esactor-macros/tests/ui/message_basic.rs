use esactor_domain::message::Message;
use esactor_macros::Message;

#[derive(Message)]
struct Ping;

#[derive(Message)]
#[message(address = "inventory.restock")]
struct Restock {
    _qty: u32,
}

fn main() {
    assert!(Ping::ADDRESS.ends_with("::Ping"));
    assert_eq!(Restock::ADDRESS, "inventory.restock");
}
