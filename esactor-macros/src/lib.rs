//! 过程宏：消息地址、聚合命令与聚合事件
//!
//! - `#[derive(Message)]`：以完全限定类型名作为默认地址；
//! - `#[derive(AggregateCommand)]`：从 `aggregate_id`/`correlation_id` 字段生成命令实现；
//! - `#[aggregate_event]`：补齐事件必需字段并生成 `AggregateEvent` 实现。
//!
use proc_macro::TokenStream;

mod aggregate_command;
mod aggregate_event;
mod message;
mod utils;

#[proc_macro_derive(Message, attributes(message))]
pub fn derive_message(input: TokenStream) -> TokenStream {
    message::expand(input)
}

#[proc_macro_derive(AggregateCommand, attributes(command))]
pub fn derive_aggregate_command(input: TokenStream) -> TokenStream {
    aggregate_command::expand(input)
}

#[proc_macro_attribute]
pub fn aggregate_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    aggregate_event::expand(attr, item)
}
