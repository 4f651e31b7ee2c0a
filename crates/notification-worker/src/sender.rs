//! 多渠道通知发送器
//!
//! 通过 `NotificationSender` trait 抽象发送行为，各渠道提供独立实现。
//! 当前版本为模拟发送（仅记录日志），替换为真实 SDK 调用时只需实现同一 trait。

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::templates::RenderedNotification;

/// 发送结果
///
/// 统一记录各渠道的发送状态，worker 汇总后记录失败渠道。
#[derive(Debug, Clone, PartialEq)]
pub struct SendResult {
    pub success: bool,
    pub channel: &'static str,
    /// 外部渠道返回的消息标识，用于追踪投递状态
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(channel: &'static str, message_id: String) -> Self {
        Self {
            success: true,
            channel,
            message_id: Some(message_id),
            error: None,
        }
    }

    pub fn failed(channel: &'static str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            channel,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// 通知发送器 trait，各渠道实现具体的推送逻辑
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送渲染后的通知
    async fn send(&self, notification: &RenderedNotification) -> Result<SendResult, WorkerError>;

    /// 渠道名称
    fn channel(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// APP 推送发送器
// ---------------------------------------------------------------------------

/// 模拟 APP 推送发送器
///
/// 生产环境中替换为 APNs / FCM 等推送服务的 SDK 调用
pub struct AppPushSender;

impl AppPushSender {
    pub const CHANNEL: &'static str = "APP_PUSH";
}

#[async_trait]
impl NotificationSender for AppPushSender {
    async fn send(&self, notification: &RenderedNotification) -> Result<SendResult, WorkerError> {
        let message_id = Uuid::now_v7().to_string();

        info!(
            channel = Self::CHANNEL,
            notification_id = %notification.notification_id,
            recipient = %notification.recipient,
            message_id = %message_id,
            title = %notification.title,
            trigger_action = %notification.trigger_action,
            "模拟发送 APP 推送通知"
        );

        Ok(SendResult::delivered(Self::CHANNEL, message_id))
    }

    fn channel(&self) -> &'static str {
        Self::CHANNEL
    }
}

// ---------------------------------------------------------------------------
// 邮件发送器
// ---------------------------------------------------------------------------

/// 模拟邮件发送器
///
/// 收件地址取自接收者的 `email` 属性，缺失时发送失败
pub struct EmailSender;

impl EmailSender {
    pub const CHANNEL: &'static str = "EMAIL";
}

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(&self, notification: &RenderedNotification) -> Result<SendResult, WorkerError> {
        let Some(address) = notification
            .recipient
            .attribute("email")
            .and_then(|v| v.as_str())
        else {
            return Err(WorkerError::SendFailed {
                channel: Self::CHANNEL.to_string(),
                reason: format!("接收者 {} 没有邮箱地址", notification.recipient),
            });
        };

        let message_id = Uuid::now_v7().to_string();

        info!(
            channel = Self::CHANNEL,
            notification_id = %notification.notification_id,
            to = %address,
            message_id = %message_id,
            title = %notification.title,
            body = %notification.text,
            "模拟发送邮件通知"
        );

        Ok(SendResult::delivered(Self::CHANNEL, message_id))
    }

    fn channel(&self) -> &'static str {
        Self::CHANNEL
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
