//! 命令注册器（CommandRegistrar）
//!
//! 把消息类型（或显式地址）绑定到处理器。默认地址为消息的完全限定类型名；
//! 双地址模式同时绑定本地地址与集群地址 `{node_id}::{address}`，两条路径共享同一邮箱，
//! 处理器无需知道消息经由哪条路径到达。
//!
use crate::bus::message_bus::{Delivery, Envelope, Mailbox, MessageBus, MessageConsumer};
use esactor_domain::message::Message;
use std::any::type_name;
use std::future::Future;

#[derive(Clone)]
pub struct CommandRegistrar {
    bus: MessageBus,
}

impl CommandRegistrar {
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// 原始邮箱，由调用方自行驱动消费循环（聚合 actor 使用）
    pub fn mailbox(&self, address: &str) -> (MessageConsumer, Mailbox) {
        self.bus.bind(&[address.to_string()])
    }

    /// 顺序处理：上一条处理完成后才取下一条
    pub fn register_command_handler<M, F, Fut>(&self, handler: F) -> MessageConsumer
    where
        M: Message,
        F: Fn(Delivery<M>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_command_handler_at(M::ADDRESS, handler)
    }

    pub fn register_command_handler_at<T, F, Fut>(&self, address: &str, handler: F) -> MessageConsumer
    where
        T: Send + 'static,
        F: Fn(Delivery<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (consumer, mailbox) = self.mailbox(address);
        spawn_sequential(mailbox, handler);
        consumer
    }

    /// 处理器的返回值即应答
    pub fn register_reply_handler<M, R, F, Fut>(&self, handler: F) -> MessageConsumer
    where
        M: Message,
        R: Send + 'static,
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.register_reply_handler_at(M::ADDRESS, handler)
    }

    pub fn register_reply_handler_at<T, R, F, Fut>(&self, address: &str, handler: F) -> MessageConsumer
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.register_command_handler_at(address, move |delivery: Delivery<T>| {
            let (body, reply) = delivery.into_parts();
            let fut = handler(body);
            async move {
                reply.reply(fut.await);
            }
        })
    }

    /// 每条消息一个任务，互不等待
    pub fn register_concurrent_handler<T, F, Fut>(&self, address: &str, handler: F) -> MessageConsumer
    where
        T: Send + 'static,
        F: Fn(Delivery<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (consumer, mailbox) = self.mailbox(address);
        spawn_concurrent(mailbox, handler);
        consumer
    }

    /// 同时绑定本地地址与集群地址
    pub fn register_with_local_and_cluster_addresses<T, F, Fut>(
        &self,
        address: &str,
        concurrent: bool,
        handler: F,
    ) -> MessageConsumer
    where
        T: Send + 'static,
        F: Fn(Delivery<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let addresses = [address.to_string(), self.bus.cluster_address(address)];
        let (consumer, mailbox) = self.bus.bind(&addresses);
        if concurrent {
            spawn_concurrent(mailbox, handler);
        } else {
            spawn_sequential(mailbox, handler);
        }
        consumer
    }
}

fn spawn_sequential<T, F, Fut>(mut mailbox: Mailbox, handler: F)
where
    T: Send + 'static,
    F: Fn(Delivery<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(envelope) = mailbox.recv().await {
            if let Some(delivery) = typed::<T>(envelope) {
                handler(delivery).await;
            }
        }
    });
}

fn spawn_concurrent<T, F, Fut>(mut mailbox: Mailbox, handler: F)
where
    T: Send + 'static,
    F: Fn(Delivery<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(envelope) = mailbox.recv().await {
            if let Some(delivery) = typed::<T>(envelope) {
                tokio::spawn(handler(delivery));
            }
        }
    });
}

fn typed<T: Send + 'static>(envelope: Envelope) -> Option<Delivery<T>> {
    match envelope.downcast::<T>() {
        Ok(delivery) => Some(delivery),
        Err(envelope) => {
            // 丢弃应答端，请求方得到 NoReply
            tracing::warn!(
                address = envelope.address(),
                codec = envelope.codec(),
                expected = type_name::<T>(),
                "dropping message of unexpected type"
            );
            None
        }
    }
}
