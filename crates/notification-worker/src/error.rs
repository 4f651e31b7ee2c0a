//! 通知工作者错误类型
//!
//! 区分渠道发送失败、模板渲染失败与核心组件错误，
//! 便于上层根据错误类型决定重试或丢弃策略。

use notifykit_shared::error::NotifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("通知发送失败: 渠道={channel}, 原因={reason}")]
    SendFailed { channel: String, reason: String },

    #[error("通知模板渲染失败: {0}")]
    TemplateRender(String),

    #[error(transparent)]
    Core(#[from] NotifyError),
}

impl WorkerError {
    /// 是否值得重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SendFailed { .. } => true,
            Self::TemplateRender(_) => false,
            Self::Core(e) => e.is_retryable(),
        }
    }
}
