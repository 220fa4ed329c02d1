//! 命令发送器（CommandSender）
//!
//! 发后即忘的 `send`、请求/应答的 `request`、带回调的 `send_with_reply_handler`
//! 以及对类型擦除消息体的 `forward`。每次请求都受 `DeliveryOptions` 中的超时约束，
//! 超时以 `BusError::Timeout` 返回而不是挂起。
//!
use crate::bus::message_bus::{AnyBody, Delivery, Envelope, MessageBus, downcast_reply};
use crate::config::DeliveryOptions;
use crate::error::{BusError, CommandFailure};
use crate::messages::{AGGREGATE_COMMAND_ADDRESS, CommandResult, RouteAggregateCommand};
use esactor_domain::message::{AggregateCommand, Message};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// 已投递、尚未收到的应答
pub struct PendingReply<R> {
    address: String,
    rx: oneshot::Receiver<AnyBody>,
    timeout: Duration,
    _reply: PhantomData<fn() -> R>,
}

impl<R: 'static> PendingReply<R> {
    pub async fn wait(self) -> Result<R, BusError> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Err(_) => Err(BusError::Timeout {
                address: self.address,
                after: self.timeout,
            }),
            Ok(Err(_)) => Err(BusError::NoReply {
                address: self.address,
            }),
            Ok(Ok(body)) => downcast_reply(body),
        }
    }
}

#[derive(Clone)]
pub struct CommandSender {
    bus: MessageBus,
    options: DeliveryOptions,
    codec: Arc<str>,
}

impl CommandSender {
    pub fn new(bus: MessageBus, options: DeliveryOptions) -> Self {
        let codec = Arc::from(options.codec.as_str());
        Self {
            bus,
            options,
            codec,
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    /// 发送到消息类型的默认地址
    pub fn send<M: Message>(&self, message: M) -> Result<(), BusError> {
        self.send_to(M::ADDRESS, message)
    }

    pub fn send_to<T: Send + 'static>(&self, address: &str, body: T) -> Result<(), BusError> {
        tracing::debug!(address, codec = %self.codec, "send");
        let envelope = Envelope::new(address, self.codec.clone(), Box::new(body), None);
        self.bus.deliver(envelope).map_err(|(err, _)| err)
    }

    pub async fn request<M, R>(&self, message: M) -> Result<R, BusError>
    where
        M: Message,
        R: Send + 'static,
    {
        self.request_to(M::ADDRESS, message).await
    }

    pub async fn request_to<T, R>(&self, address: &str, body: T) -> Result<R, BusError>
    where
        T: Send + 'static,
        R: Send + 'static,
    {
        self.dispatch(address, Box::new(body))
            .map_err(|(err, _)| err)?
            .wait()
            .await
    }

    /// 入队后立即返回，应答稍后通过 `PendingReply::wait` 获取
    pub fn dispatch<R: 'static>(
        &self,
        address: &str,
        body: AnyBody,
    ) -> Result<PendingReply<R>, (BusError, AnyBody)> {
        let (tx, rx) = oneshot::channel();
        let envelope = Envelope::new(address, self.codec.clone(), body, Some(tx));
        match self.bus.deliver(envelope) {
            Ok(()) => {
                tracing::debug!(address, codec = %self.codec, "request");
                Ok(PendingReply {
                    address: address.to_string(),
                    rx,
                    timeout: self.options.send_timeout(),
                    _reply: PhantomData,
                })
            }
            Err((err, envelope)) => {
                let (_, body, _) = envelope.into_parts();
                Err((err, body))
            }
        }
    }

    /// 转发类型擦除的消息体，并返回原始应答；无处理器时交还消息体以便重试
    pub async fn forward(
        &self,
        address: &str,
        body: AnyBody,
    ) -> Result<Result<AnyBody, BusError>, AnyBody> {
        match self.dispatch::<AnyBody>(address, body) {
            Ok(pending) => Ok(pending.wait_raw().await),
            Err((BusError::NoHandlers { .. }, body)) => Err(body),
            Err((err, _)) => Ok(Err(err)),
        }
    }

    /// 应答在后台等待，完成（或超时）后调用 `handler`
    pub fn send_with_reply_handler<T, R, F>(
        &self,
        address: &str,
        body: T,
        handler: F,
    ) -> Result<(), BusError>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: FnOnce(Result<R, BusError>) + Send + 'static,
    {
        let pending = self
            .dispatch::<R>(address, Box::new(body))
            .map_err(|(err, _)| err)?;
        tokio::spawn(async move { handler(pending.wait().await) });
        Ok(())
    }

    pub fn reply<T, R: Send + 'static>(&self, delivery: Delivery<T>, value: R) -> bool {
        delivery.reply(value)
    }

    /// 经聚合命令路由器投递命令；投递层面的失败同样以 `CommandFailure` 返回
    pub async fn send_aggregate_command<C: AggregateCommand>(&self, command: C) -> CommandResult {
        let route = RouteAggregateCommand::new(command);
        tracing::debug!(
            aggregate_id = %route.aggregate_id(),
            correlation_id = %route.correlation_id(),
            command = route.command_name(),
            "sending aggregate command"
        );
        match self
            .request_to::<_, CommandResult>(AGGREGATE_COMMAND_ADDRESS, route)
            .await
        {
            Ok(result) => result,
            Err(err) => Err(CommandFailure::Bus(err)),
        }
    }
}

impl PendingReply<AnyBody> {
    async fn wait_raw(self) -> Result<AnyBody, BusError> {
        match tokio::time::timeout(self.timeout, self.rx).await {
            Err(_) => Err(BusError::Timeout {
                address: self.address,
                after: self.timeout,
            }),
            Ok(Err(_)) => Err(BusError::NoReply {
                address: self.address,
            }),
            Ok(Ok(body)) => Ok(body),
        }
    }
}
