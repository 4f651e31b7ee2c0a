//! 通知分发器
//!
//! 分发器通过一个渠道投递一条通知。处理器按名称引用分发器，
//! [`DispatcherRegistry`] 在启动时登记名称到工厂的映射，每次投递
//! 由工厂创建分发器实例。名称即分发器的类型身份，同名分发器在一个
//! 处理器内只执行一次。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use notifykit_shared::error::{NotifyError, Result};
use tracing::info;

use crate::models::Notification;
use crate::queue::{DispatchJob, QueueMessage, TaskQueue};

/// 通知分发器
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// 分发器名称，处理器以此引用
    fn name(&self) -> &'static str;

    /// 投递一条通知，失败向调用方传播，核心不做重试
    async fn dispatch(&self, notification: &Notification) -> Result<()>;
}

/// 分发器工厂
pub type DispatcherFactory = Arc<dyn Fn() -> Arc<dyn Dispatcher> + Send + Sync>;

/// 分发器注册表
#[derive(Clone, Default)]
pub struct DispatcherRegistry {
    factories: HashMap<&'static str, DispatcherFactory>,
}

impl fmt::Debug for DispatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以工厂注册分发器，同名注册被替换
    pub fn register<F>(&mut self, name: &'static str, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Dispatcher> + Send + Sync + 'static,
    {
        self.factories.insert(name, Arc::new(factory));
        self
    }

    /// 注册共享实例，每次投递复用同一个实例
    pub fn register_instance(&mut self, dispatcher: Arc<dyn Dispatcher>) -> &mut Self {
        let name = dispatcher.name();
        self.register(name, move || Arc::clone(&dispatcher))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 创建分发器实例，未注册的名称视为配置错误
    pub fn instantiate(&self, name: &str) -> Result<Arc<dyn Dispatcher>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            NotifyError::configuration(format!("分发器 {name} 未注册"))
        })?;
        Ok(factory())
    }
}

/// 按声明顺序去重
pub fn unique_dispatchers(names: Vec<&'static str>) -> Vec<&'static str> {
    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}

// ---------------------------------------------------------------------------
// 日志分发器
// ---------------------------------------------------------------------------

/// 即时投递到结构化日志
///
/// 开发环境中替代真实渠道，便于观察处理器产出的通知
#[derive(Debug, Default)]
pub struct LogDispatcher;

impl LogDispatcher {
    pub const NAME: &'static str = "log";
}

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn dispatch(&self, notification: &Notification) -> Result<()> {
        info!(
            dispatcher = Self::NAME,
            notification_id = %notification.id,
            recipient = %notification.recipient,
            title = %notification.title(),
            "投递通知"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 队列分发器
// ---------------------------------------------------------------------------

/// 投递到后台任务队列，由 worker 异步渲染并发送
///
/// 入队发生在处理器事务提交之前：同一次调用中后续的分发失败会回滚存储，
/// 但已入队的任务不会撤回，worker 会按任务快照投递这条未提交的通知。
#[derive(Debug, Clone)]
pub struct QueueDispatcher {
    queue: TaskQueue,
}

impl QueueDispatcher {
    pub const NAME: &'static str = "queue";

    pub fn new(queue: TaskQueue) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn dispatch(&self, notification: &Notification) -> Result<()> {
        self.queue
            .enqueue(QueueMessage::Dispatch(DispatchJob::new(notification.clone())))
    }
}
