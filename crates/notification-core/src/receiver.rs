//! 信号接收器
//!
//! 接收器是信号发送方与处理器之间唯一的耦合点：按信号查找注册项，
//! 按发送方过滤，为每个匹配的处理器创建新实例并执行。
//! 多个处理器依次执行，第一个失败即向上传播。

use std::sync::Arc;

use async_trait::async_trait;
use notifykit_shared::error::{NotifyError, Result};
use notifykit_shared::events::{SenderType, Signal, SignalKwargs};
use tracing::{debug, instrument};

use crate::handler::HandlerRunner;
use crate::models::Notification;
use crate::queue::{QueueMessage, SignalJob, TaskQueue};
use crate::registry::SignalRegistry;

/// 单个处理器的执行结果
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub handler: &'static str,
    pub notifications: Vec<Notification>,
}

/// 信号接收器
#[async_trait]
pub trait Receiver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn receive(
        &self,
        signal: &Signal,
        sender: Option<&SenderType>,
        kwargs: SignalKwargs,
    ) -> Result<Vec<HandlerOutcome>>;
}

// ---------------------------------------------------------------------------
// 同步接收器
// ---------------------------------------------------------------------------

/// 在信号发送方的调用链中直接执行处理器
pub struct SynchronousReceiver {
    registry: Arc<SignalRegistry>,
    runner: Arc<HandlerRunner>,
}

impl SynchronousReceiver {
    pub const NAME: &'static str = "SynchronousReceiver";

    pub fn new(registry: Arc<SignalRegistry>, runner: Arc<HandlerRunner>) -> Self {
        Self { registry, runner }
    }
}

#[async_trait]
impl Receiver for SynchronousReceiver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[instrument(skip_all, fields(signal = %signal, sender = ?sender))]
    async fn receive(
        &self,
        signal: &Signal,
        sender: Option<&SenderType>,
        kwargs: SignalKwargs,
    ) -> Result<Vec<HandlerOutcome>> {
        let mut outcomes = Vec::new();

        for registration in self.registry.get(signal) {
            if !registration.accepts(sender) {
                debug!(handler = ?registration.handler, "发送方不在允许列表中，跳过");
                continue;
            }

            let handler = registration.handler.instantiate();
            let notifications = self.runner.handle(handler.as_ref(), kwargs.clone()).await?;
            outcomes.push(HandlerOutcome {
                handler: registration.handler.short_name(),
                notifications,
            });
        }

        if outcomes.is_empty() {
            debug!("没有匹配的处理器");
        }
        Ok(outcomes)
    }
}

// ---------------------------------------------------------------------------
// 队列接收器
// ---------------------------------------------------------------------------

/// 将信号写入后台任务队列，由 worker 以同步接收器执行
///
/// 入队后立即返回，不产生任何处理结果
pub struct QueuedReceiver {
    queue: TaskQueue,
}

impl QueuedReceiver {
    pub const NAME: &'static str = "QueuedReceiver";

    pub fn new(queue: TaskQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Receiver for QueuedReceiver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn receive(
        &self,
        signal: &Signal,
        sender: Option<&SenderType>,
        kwargs: SignalKwargs,
    ) -> Result<Vec<HandlerOutcome>> {
        let job = SignalJob::new(signal.clone(), sender.cloned(), kwargs);
        debug!(signal = %signal, job_id = %job.job_id, "信号已转入后台队列");
        self.queue.enqueue(QueueMessage::Signal(job))?;
        Ok(Vec::new())
    }
}

/// 按 `RECEIVER` 配置项构建接收器
pub fn build_receiver(
    name: &str,
    registry: Arc<SignalRegistry>,
    runner: Arc<HandlerRunner>,
    queue: Option<TaskQueue>,
) -> Result<Arc<dyn Receiver>> {
    match name {
        SynchronousReceiver::NAME => Ok(Arc::new(SynchronousReceiver::new(registry, runner))),
        QueuedReceiver::NAME => {
            let queue = queue.ok_or_else(|| {
                NotifyError::configuration("QueuedReceiver 需要配置后台任务队列")
            })?;
            Ok(Arc::new(QueuedReceiver::new(queue)))
        }
        other => Err(NotifyError::configuration(format!(
            "RECEIVER 指向未知的接收器: {other}"
        ))),
    }
}
