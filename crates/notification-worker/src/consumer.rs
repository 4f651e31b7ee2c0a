//! 后台任务消费者
//!
//! 从任务队列消费消息：排队的信号交给同步接收器执行处理器，
//! 排队的投递先渲染再并行推送到所有渠道，单个渠道失败不影响其他渠道。

use std::sync::Arc;

use notifykit_core::NotificationCenter;
use notifykit_core::queue::{DispatchJob, QueueMessage, SignalJob};
use notifykit_core::receiver::Receiver;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::sender::{NotificationSender, SendResult};
use crate::templates::{NotificationRenderer, RenderedNotification};

/// 通知工作者
pub struct NotificationWorker {
    center: NotificationCenter,
    renderer: NotificationRenderer,
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl NotificationWorker {
    pub fn new(
        center: NotificationCenter,
        renderer: NotificationRenderer,
        senders: Vec<Arc<dyn NotificationSender>>,
    ) -> Self {
        Self {
            center,
            renderer,
            senders,
        }
    }

    /// 启动消费循环，直到收到 shutdown 信号或队列关闭
    ///
    /// 单条消息处理失败只记录日志，不中断循环
    pub async fn run(
        self,
        mut queue: mpsc::Receiver<QueueMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), WorkerError> {
        info!(senders = self.senders.len(), "通知工作者已启动");

        loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("收到关闭信号，通知工作者退出");
                        break;
                    }
                }

                message = queue.recv() => {
                    let Some(message) = message else {
                        warn!("任务队列已关闭");
                        break;
                    };

                    let job_id = message.job_id();
                    if let Err(e) = self.handle_message(message).await {
                        error!(
                            job_id = %job_id,
                            error = %e,
                            retryable = e.is_retryable(),
                            "处理后台任务失败"
                        );
                    }
                }
            }
        }

        info!("通知工作者已停止");
        Ok(())
    }

    /// 处理单条队列消息
    pub async fn handle_message(&self, message: QueueMessage) -> Result<(), WorkerError> {
        match message {
            QueueMessage::Signal(job) => self.handle_signal(job).await,
            QueueMessage::Dispatch(job) => self.handle_dispatch(job).await.map(|_| ()),
        }
    }

    async fn handle_signal(&self, job: SignalJob) -> Result<(), WorkerError> {
        debug!(job_id = %job.job_id, signal = %job.signal, "执行排队的信号");

        let outcomes = self
            .center
            .synchronous_receiver()
            .receive(&job.signal, job.sender.as_ref(), job.kwargs)
            .await?;

        info!(
            job_id = %job.job_id,
            signal = %job.signal,
            handlers = outcomes.len(),
            notifications = outcomes.iter().map(|o| o.notifications.len()).sum::<usize>(),
            "排队的信号处理完成"
        );
        Ok(())
    }

    /// 渲染并投递，返回各渠道的发送结果
    ///
    /// 已提交的通知按存储中的最新模板内容渲染，尚未提交时使用任务携带的快照
    pub async fn handle_dispatch(&self, job: DispatchJob) -> Result<Vec<SendResult>, WorkerError> {
        let notification = match self
            .center
            .runner()
            .store()
            .notification(job.notification.id)
            .await?
        {
            Some(stored) => stored,
            None => {
                debug!(notification_id = %job.notification.id, "通知尚未提交，使用任务快照");
                job.notification
            }
        };

        let rendered = self.renderer.render(&notification)?;
        let results = send_all(&self.senders, &rendered).await;

        for result in results.iter().filter(|r| !r.success) {
            warn!(
                notification_id = %rendered.notification_id,
                channel = result.channel,
                error = ?result.error,
                "渠道发送失败"
            );
        }

        info!(
            job_id = %job.job_id,
            notification_id = %rendered.notification_id,
            total_channels = results.len(),
            success_count = results.iter().filter(|r| r.success).count(),
            "通知投递完成"
        );
        Ok(results)
    }
}

/// 并行发送到所有渠道
///
/// 使用 futures::future::join_all 并行执行，单个渠道的失败不会阻塞其他渠道
pub async fn send_all(
    senders: &[Arc<dyn NotificationSender>],
    notification: &RenderedNotification,
) -> Vec<SendResult> {
    let futures: Vec<_> = senders
        .iter()
        .map(|sender| async move {
            let channel = sender.channel();
            match sender.send(notification).await {
                Ok(result) => result,
                Err(e) => {
                    error!(channel, error = %e, "发送器执行异常");
                    SendResult::failed(channel, e.to_string())
                }
            }
        })
        .collect();

    futures::future::join_all(futures).await
}
