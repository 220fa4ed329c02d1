//! 寻址消息子系统：总线、注册器与发送器
//!
pub mod message_bus;
pub mod registrar;
pub mod sender;

pub use message_bus::{
    AnyBody, Delivery, Envelope, Mailbox, MessageBus, MessageConsumer, ReplyHandle,
    cluster_address,
};
pub use registrar::CommandRegistrar;
pub use sender::{CommandSender, PendingReply};
