//! 统一错误处理模块
//!
//! 定义通知组件中所有共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 配置类错误应在启动阶段尽早暴露，运行期错误原样向信号发送方传播。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum NotifyError {
    // ==================== 配置错误 ====================
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("无效的配置项: \"{0}\"")]
    InvalidSetting(String),

    #[error("配置加载失败: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    // ==================== 处理器错误 ====================
    #[error("处理器未实现必需的方法: {handler}::{hook}")]
    NotImplemented { handler: String, hook: String },

    #[error("信号参数无效: {key} - {message}")]
    InvalidKwarg { key: String, message: String },

    // ==================== 投递错误 ====================
    #[error("通知投递失败: 分发器={dispatcher}, 原因={reason}")]
    Delivery { dispatcher: String, reason: String },

    #[error("任务队列错误: {0}")]
    Queue(String),

    // ==================== 存储错误 ====================
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== 通用错误 ====================
    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, NotifyError>;

impl NotifyError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "IMPROPERLY_CONFIGURED",
            Self::InvalidSetting(_) => "INVALID_SETTING",
            Self::ConfigLoad(_) => "CONFIG_LOAD_ERROR",
            Self::NotImplemented { .. } => "NOT_IMPLEMENTED",
            Self::InvalidKwarg { .. } => "INVALID_KWARG",
            Self::Delivery { .. } => "DELIVERY_FAILED",
            Self::Queue(_) => "QUEUE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 核心管道本身不做重试，该标记供后台任务队列的消费方决定重投策略
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Delivery { .. } | Self::Queue(_))
    }

    /// 是否为配置类错误（启动期即应失败）
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::InvalidSetting(_) | Self::ConfigLoad(_)
        )
    }

    /// 构造配置错误的便捷方法
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = NotifyError::NotImplemented {
            handler: "CommentHandler".to_string(),
            hook: "recipients".to_string(),
        };
        assert_eq!(err.code(), "NOT_IMPLEMENTED");
        assert_eq!(
            err.to_string(),
            "处理器未实现必需的方法: CommentHandler::recipients"
        );
    }

    #[test]
    fn test_is_retryable() {
        let delivery = NotifyError::Delivery {
            dispatcher: "email".to_string(),
            reason: "SMTP 超时".to_string(),
        };
        assert!(delivery.is_retryable());

        let config = NotifyError::configuration("缺少 Meta");
        assert!(!config.is_retryable());
        assert!(config.is_configuration());
    }

    #[test]
    fn test_invalid_setting_display() {
        let err = NotifyError::InvalidSetting("FOO".to_string());
        assert_eq!(err.to_string(), "无效的配置项: \"FOO\"");
    }
}
