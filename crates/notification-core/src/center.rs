//! 通知中心
//!
//! 启动阶段的组装入口：按配置加载处理器模块、解析通知模型与接收器，
//! 之后注册表只读共享，信号通过 [`NotificationCenter::send`] 进入管道。

use std::sync::Arc;

use notifykit_shared::config::NotifySettings;
use notifykit_shared::error::Result;
use notifykit_shared::events::{SenderType, Signal, SignalKwargs};
use tracing::info;

use crate::autoload::HandlerCatalog;
use crate::dispatcher::DispatcherRegistry;
use crate::handler::HandlerRunner;
use crate::notification_model::ModelRegistry;
use crate::queue::TaskQueue;
use crate::receiver::{HandlerOutcome, Receiver, SynchronousReceiver, build_receiver};
use crate::registry::SignalRegistry;
use crate::store::NotificationStore;

/// 通知中心构建器
pub struct NotificationCenterBuilder {
    settings: NotifySettings,
    registry: SignalRegistry,
    catalog: HandlerCatalog,
    dispatchers: DispatcherRegistry,
    models: ModelRegistry,
    queue: Option<TaskQueue>,
}

impl NotificationCenterBuilder {
    /// 直接注册的处理器（与自动加载的模块合并）
    pub fn registry(mut self, registry: SignalRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn dispatchers(mut self, dispatchers: DispatcherRegistry) -> Self {
        self.dispatchers = dispatchers;
        self
    }

    pub fn models(mut self, models: ModelRegistry) -> Self {
        self.models = models;
        self
    }

    pub fn queue(mut self, queue: TaskQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// 完成组装，所有配置错误在此暴露
    pub fn build(self, store: Arc<dyn NotificationStore>) -> Result<NotificationCenter> {
        let Self {
            settings,
            mut registry,
            catalog,
            dispatchers,
            models,
            queue,
        } = self;

        catalog.load(&settings.autoload_modules, &mut registry)?;

        let settings = Arc::new(settings);
        let registry = Arc::new(registry);
        let runner = Arc::new(HandlerRunner::new(
            Arc::clone(&settings),
            store,
            Arc::new(dispatchers),
            &models,
        )?);
        let receiver = build_receiver(
            &settings.receiver,
            Arc::clone(&registry),
            Arc::clone(&runner),
            queue,
        )?;

        info!(
            receiver = receiver.name(),
            notification_model = %settings.notification_model,
            registrations = registry.len(),
            "通知中心已就绪"
        );

        Ok(NotificationCenter {
            registry,
            runner,
            receiver,
        })
    }
}

/// 通知中心
#[derive(Clone)]
pub struct NotificationCenter {
    registry: Arc<SignalRegistry>,
    runner: Arc<HandlerRunner>,
    receiver: Arc<dyn Receiver>,
}

impl NotificationCenter {
    pub fn builder(settings: NotifySettings) -> NotificationCenterBuilder {
        NotificationCenterBuilder {
            settings,
            registry: SignalRegistry::new(),
            catalog: HandlerCatalog::new(),
            dispatchers: DispatcherRegistry::new(),
            models: ModelRegistry::new(),
            queue: None,
        }
    }

    pub fn registry(&self) -> &Arc<SignalRegistry> {
        &self.registry
    }

    pub fn runner(&self) -> &Arc<HandlerRunner> {
        &self.runner
    }

    pub fn receiver(&self) -> &Arc<dyn Receiver> {
        &self.receiver
    }

    /// 发出信号，交由配置的接收器处理
    pub async fn send(
        &self,
        signal: &Signal,
        sender: Option<&SenderType>,
        kwargs: SignalKwargs,
    ) -> Result<Vec<HandlerOutcome>> {
        self.receiver.receive(signal, sender, kwargs).await
    }

    /// 绕过配置的接收器同步处理信号，供后台 worker 执行排队的信号
    pub fn synchronous_receiver(&self) -> SynchronousReceiver {
        SynchronousReceiver::new(Arc::clone(&self.registry), Arc::clone(&self.runner))
    }
}
