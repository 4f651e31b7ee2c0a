//! 通知模型注册表
//!
//! `NOTIFICATION_MODEL` 配置项按名称选择创建通知时使用的模型。
//! 名称在构建处理器运行器时解析一次并注入，不在每次调用时重新解析。

use std::collections::HashMap;
use std::sync::Arc;

use notifykit_shared::config::DEFAULT_NOTIFICATION_MODEL;
use notifykit_shared::error::{NotifyError, Result};

use crate::models::Notification;

/// 通知模型
///
/// 模型决定通知记录上的模型名称，并可以在写入前调整通知内容
pub trait NotificationModel: Send + Sync {
    fn label(&self) -> &str;

    /// 写入存储前的预处理钩子
    fn prepare(&self, _notification: &mut Notification) {}
}

/// 内置通知模型
pub struct DefaultNotificationModel;

impl NotificationModel for DefaultNotificationModel {
    fn label(&self) -> &str {
        DEFAULT_NOTIFICATION_MODEL
    }
}

/// 代理模型：与内置模型行为一致，仅名称不同
pub struct ProxyNotificationModel {
    label: String,
}

impl ProxyNotificationModel {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl NotificationModel for ProxyNotificationModel {
    fn label(&self) -> &str {
        &self.label
    }
}

/// 通知模型注册表，默认包含内置模型
#[derive(Clone)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn NotificationModel>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            models: HashMap::new(),
        };
        registry.register(Arc::new(DefaultNotificationModel));
        registry
    }

    /// 注册模型，同名模型被替换
    pub fn register(&mut self, model: Arc<dyn NotificationModel>) -> &mut Self {
        self.models.insert(model.label().to_string(), model);
        self
    }

    /// 注册一个代理模型
    pub fn register_proxy(&mut self, label: impl Into<String>) -> &mut Self {
        self.register(Arc::new(ProxyNotificationModel::new(label)))
    }

    /// 按名称解析模型，未注册的名称视为配置错误
    pub fn resolve(&self, label: &str) -> Result<Arc<dyn NotificationModel>> {
        self.models.get(label).cloned().ok_or_else(|| {
            NotifyError::configuration(format!("NOTIFICATION_MODEL 指向未注册的通知模型: {label}"))
        })
    }
}
