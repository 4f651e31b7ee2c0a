//! 后台任务队列
//!
//! 队列消息分两类：待后台执行的信号（由 `QueuedReceiver` 产生）与
//! 待投递的通知（由 `QueueDispatcher` 产生）。入队不等待消费，
//! 队列已满或已关闭时立即返回错误。

use chrono::{DateTime, Utc};
use notifykit_shared::error::{NotifyError, Result};
use notifykit_shared::events::{SenderType, Signal, SignalKwargs};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::models::Notification;

/// 待后台执行的信号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalJob {
    pub job_id: Uuid,
    pub signal: Signal,
    pub sender: Option<SenderType>,
    pub kwargs: SignalKwargs,
    pub enqueued_at: DateTime<Utc>,
}

impl SignalJob {
    pub fn new(signal: Signal, sender: Option<SenderType>, kwargs: SignalKwargs) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            signal,
            sender,
            kwargs,
            enqueued_at: Utc::now(),
        }
    }
}

/// 待投递的通知
///
/// 携带完整的通知而非 ID，消费方无需等待创建事务提交即可投递
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchJob {
    pub job_id: Uuid,
    pub notification: Notification,
    pub enqueued_at: DateTime<Utc>,
}

impl DispatchJob {
    pub fn new(notification: Notification) -> Self {
        Self {
            job_id: Uuid::now_v7(),
            notification,
            enqueued_at: Utc::now(),
        }
    }
}

/// 队列消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueMessage {
    Signal(SignalJob),
    Dispatch(DispatchJob),
}

impl QueueMessage {
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::Signal(job) => job.job_id,
            Self::Dispatch(job) => job.job_id,
        }
    }
}

/// 任务队列的生产端
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<QueueMessage>,
}

/// 创建有界任务队列，返回生产端与消费端
pub fn task_queue(capacity: usize) -> (TaskQueue, mpsc::Receiver<QueueMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TaskQueue { tx }, rx)
}

impl TaskQueue {
    /// 入队，不等待消费
    pub fn enqueue(&self, message: QueueMessage) -> Result<()> {
        let job_id = message.job_id();
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::Queue("任务队列已满".to_string()),
            mpsc::error::TrySendError::Closed(_) => {
                NotifyError::Queue("任务队列已关闭".to_string())
            }
        })?;
        debug!(job_id = %job_id, "任务已入队");
        Ok(())
    }
}
