//! 进程内寻址消息总线
//!
//! 地址空间为字符串；每个消费者持有一个邮箱（无界 mpsc 通道），且只有一个消费循环。
//! 点对点投递在同一地址的多个消费者之间轮询；广播投递给全部消费者。
//! 消息体以 `Box<dyn Any + Send>` 类型擦除，接收端按期望类型还原。
//!
use crate::error::BusError;
use dashmap::DashMap;
use std::any::{Any, type_name};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};

pub type AnyBody = Box<dyn Any + Send>;

/// 集群范围地址
pub fn cluster_address(node_id: &str, address: &str) -> String {
    format!("{node_id}::{address}")
}

/// 类型擦除的在途消息
pub struct Envelope {
    address: String,
    codec: Arc<str>,
    body: AnyBody,
    reply_to: Option<oneshot::Sender<AnyBody>>,
}

impl Envelope {
    pub(crate) fn new(
        address: impl Into<String>,
        codec: Arc<str>,
        body: AnyBody,
        reply_to: Option<oneshot::Sender<AnyBody>>,
    ) -> Self {
        Self {
            address: address.into(),
            codec,
            body,
            reply_to,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// 还原为类型化消息；类型不符时原样交还
    pub fn downcast<T: Send + 'static>(self) -> Result<Delivery<T>, Envelope> {
        let Envelope {
            address,
            codec,
            body,
            reply_to,
        } = self;
        match body.downcast::<T>() {
            Ok(body) => Ok(Delivery {
                address,
                body: *body,
                reply: ReplyHandle { tx: reply_to },
            }),
            Err(body) => Err(Envelope {
                address,
                codec,
                body,
                reply_to,
            }),
        }
    }

    pub fn into_parts(self) -> (String, AnyBody, ReplyHandle) {
        (self.address, self.body, ReplyHandle { tx: self.reply_to })
    }
}

/// 类型化的已接收消息
pub struct Delivery<T> {
    address: String,
    body: T,
    reply: ReplyHandle,
}

impl<T> Delivery<T> {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn expects_reply(&self) -> bool {
        self.reply.is_expected()
    }

    /// 应答发送方；对方不等待应答或已放弃时返回 false
    pub fn reply<R: Send + 'static>(self, value: R) -> bool {
        self.reply.reply(value)
    }

    pub fn into_parts(self) -> (T, ReplyHandle) {
        (self.body, self.reply)
    }
}

/// 延迟应答句柄，最多使用一次
pub struct ReplyHandle {
    tx: Option<oneshot::Sender<AnyBody>>,
}

impl ReplyHandle {
    pub fn is_expected(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn reply<R: Send + 'static>(self, value: R) -> bool {
        self.reply_any(Box::new(value))
    }

    pub fn reply_any(mut self, value: AnyBody) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

/// 消费者邮箱：一次交付一条消息
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Mailbox {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// 拒绝新的投递，已入队的消息仍可取出
    pub fn close(&mut self) {
        self.rx.close();
    }
}

struct ConsumerSlot {
    id: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

pub(crate) struct BusInner {
    node_id: String,
    consumers: DashMap<String, Vec<ConsumerSlot>>,
    next_consumer: AtomicU64,
    cursor: AtomicUsize,
}

impl BusInner {
    fn remove_consumer(&self, id: u64, addresses: &[String]) {
        for address in addresses {
            if let Some(mut slots) = self.consumers.get_mut(address) {
                slots.retain(|s| s.id != id);
            }
            self.consumers.remove_if(address, |_, slots| slots.is_empty());
        }
    }
}

/// 注册句柄：`unregister` 从持有的全部地址上移除该消费者
pub struct MessageConsumer {
    id: u64,
    addresses: Vec<String>,
    bus: Arc<BusInner>,
}

impl MessageConsumer {
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn unregister(&self) {
        self.bus.remove_consumer(self.id, &self.addresses);
        tracing::debug!(addresses = ?self.addresses, "consumer unregistered");
    }
}

#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                node_id: node_id.into(),
                consumers: DashMap::new(),
                next_consumer: AtomicU64::new(1),
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn cluster_address(&self, address: &str) -> String {
        cluster_address(&self.inner.node_id, address)
    }

    pub fn has_handlers(&self, address: &str) -> bool {
        self.inner
            .consumers
            .get(address)
            .is_some_and(|slots| slots.iter().any(|s| !s.tx.is_closed()))
    }

    /// 在给定地址上绑定一个共享邮箱的消费者
    pub fn bind(&self, addresses: &[String]) -> (MessageConsumer, Mailbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_consumer.fetch_add(1, Ordering::Relaxed);
        for address in addresses {
            self.inner
                .consumers
                .entry(address.clone())
                .or_default()
                .push(ConsumerSlot { id, tx: tx.clone() });
        }
        tracing::debug!(?addresses, consumer = id, "consumer bound");
        (
            MessageConsumer {
                id,
                addresses: addresses.to_vec(),
                bus: self.inner.clone(),
            },
            Mailbox { rx },
        )
    }

    /// 点对点投递；无可用消费者时交还信封
    pub fn deliver(&self, envelope: Envelope) -> Result<(), (BusError, Envelope)> {
        let senders: Vec<(u64, mpsc::UnboundedSender<Envelope>)> = match self
            .inner
            .consumers
            .get(envelope.address())
        {
            Some(slots) => slots.iter().map(|s| (s.id, s.tx.clone())).collect(),
            None => Vec::new(),
        };

        let start = self.inner.cursor.fetch_add(1, Ordering::Relaxed);
        let mut envelope = envelope;
        let mut dead = Vec::new();
        for i in 0..senders.len() {
            let (id, tx) = &senders[(start + i) % senders.len()];
            match tx.send(envelope) {
                Ok(()) => {
                    self.drop_dead(&dead);
                    return Ok(());
                }
                Err(mpsc::error::SendError(returned)) => {
                    dead.push((*id, returned.address.clone()));
                    envelope = returned;
                }
            }
        }
        self.drop_dead(&dead);

        let address = envelope.address.clone();
        Err((BusError::NoHandlers { address }, envelope))
    }

    /// 广播给地址上的全部消费者，返回投递数
    pub fn publish<T>(&self, address: &str, codec: Arc<str>, body: T) -> usize
    where
        T: Clone + Send + 'static,
    {
        let senders: Vec<mpsc::UnboundedSender<Envelope>> = match self.inner.consumers.get(address)
        {
            Some(slots) => slots.iter().map(|s| s.tx.clone()).collect(),
            None => return 0,
        };
        senders
            .into_iter()
            .filter(|tx| {
                let envelope = Envelope::new(address, codec.clone(), Box::new(body.clone()), None);
                tx.send(envelope).is_ok()
            })
            .count()
    }

    fn drop_dead(&self, dead: &[(u64, String)]) {
        for (id, address) in dead {
            self.inner.remove_consumer(*id, std::slice::from_ref(address));
        }
    }
}

/// 按期望类型还原应答
pub(crate) fn downcast_reply<R: 'static>(body: AnyBody) -> Result<R, BusError> {
    body.downcast::<R>()
        .map(|r| *r)
        .map_err(|_| BusError::TypeMismatch {
            expected: type_name::<R>(),
            found: "unknown",
        })
}
