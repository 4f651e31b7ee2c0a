//! 通知处理器
//!
//! [`NotificationHandler`] 声明一个信号触发时：通知谁、用什么模板、附带哪些
//! 数据、经由哪些分发器投递。[`HandlerRunner`] 负责按固定顺序编排一次调用：
//!
//! ```text
//! 基础门控 && can_handle ──否──► 返回空
//!        │是
//!        ▼
//! recipients ─► 解析模板（未激活则中止）
//!        │
//!        ▼  对每个接收者（按顺序）
//! can_create_notification ─► 创建通知 ─► 依次执行去重后的分发器
//!        │
//!        ▼
//! 提交事务，返回创建的通知
//! ```
//!
//! 模板与通知的写入处于同一个事务中：任一步骤失败（包括分发器投递失败），
//! 本次调用不会留下任何已提交的记录。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use notifykit_shared::config::NotifySettings;
use notifykit_shared::error::{NotifyError, Result};
use notifykit_shared::events::{self, EntityRef, SignalKwargs};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::dispatcher::{DispatcherRegistry, unique_dispatchers};
use crate::models::{ExtraMap, Notification, RelatedObject, TemplateData};
use crate::notification_model::{ModelRegistry, NotificationModel};
use crate::registry::HandlerMeta;
use crate::store::NotificationStore;
use crate::template::{TemplateResolver, TemplateSource};

// ---------------------------------------------------------------------------
// HandlerContext 单次调用上下文
// ---------------------------------------------------------------------------

/// 单次处理器调用的上下文，携带触发信号的参数
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    signal_kwargs: SignalKwargs,
}

impl HandlerContext {
    pub fn new(signal_kwargs: SignalKwargs) -> Self {
        Self { signal_kwargs }
    }

    pub fn signal_kwargs(&self) -> &SignalKwargs {
        &self.signal_kwargs
    }

    /// 解析可选的信号参数
    pub fn kwarg<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        events::kwarg(&self.signal_kwargs, key)
    }

    /// 解析必需的信号参数
    pub fn required_kwarg<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        events::required_kwarg(&self.signal_kwargs, key)
    }
}

// ---------------------------------------------------------------------------
// NotificationHandler 处理器 trait
// ---------------------------------------------------------------------------

/// 通知处理器
///
/// 只有 [`recipients`](Self::recipients) 必须实现；模板来源需在
/// [`template_slug`](Self::template_slug) 与 [`template_data`](Self::template_data)
/// 中二选一。其余钩子都有默认实现。
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// 注册用元数据，缺失时注册报配置错误
    fn meta() -> Option<HandlerMeta>
    where
        Self: Sized,
    {
        None
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// 通知接收者，按返回顺序创建通知
    async fn recipients(&self, _ctx: &HandlerContext) -> Result<Vec<EntityRef>> {
        Err(NotifyError::NotImplemented {
            handler: self.name().to_string(),
            hook: "recipients".to_string(),
        })
    }

    /// 引用的管理模板 slug
    fn template_slug(&self) -> Option<&str> {
        None
    }

    /// 内联模板数据
    fn template_data(&self, _ctx: &HandlerContext) -> Result<Option<TemplateData>> {
        Ok(None)
    }

    /// 关联对象，键为关联名称
    fn related_objects(&self, _ctx: &HandlerContext) -> Result<BTreeMap<String, EntityRef>> {
        Ok(BTreeMap::new())
    }

    fn extra_data(&self, _ctx: &HandlerContext) -> Result<ExtraMap> {
        Ok(ExtraMap::new())
    }

    /// 投递通知的分发器名称，按声明顺序执行，重复项只执行一次
    fn dispatchers(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// 本次调用的附加门控，与基础门控取逻辑与
    fn can_handle(&self, _ctx: &HandlerContext) -> bool {
        true
    }

    fn can_create_notification(&self, _ctx: &HandlerContext, _recipient: &EntityRef) -> bool {
        true
    }

    fn can_dispatch_notification(
        &self,
        _ctx: &HandlerContext,
        _notification: &Notification,
        _dispatcher: &str,
    ) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// HandlerRunner 处理器编排
// ---------------------------------------------------------------------------

/// 处理器运行器
///
/// 持有存储、分发器注册表与解析好的通知模型，构建后在所有信号处理间共享
pub struct HandlerRunner {
    settings: Arc<NotifySettings>,
    store: Arc<dyn NotificationStore>,
    dispatchers: Arc<DispatcherRegistry>,
    model: Arc<dyn NotificationModel>,
}

impl HandlerRunner {
    /// 构建运行器，`NOTIFICATION_MODEL` 在此解析一次
    pub fn new(
        settings: Arc<NotifySettings>,
        store: Arc<dyn NotificationStore>,
        dispatchers: Arc<DispatcherRegistry>,
        models: &ModelRegistry,
    ) -> Result<Self> {
        let model = models.resolve(&settings.notification_model)?;
        Ok(Self {
            settings,
            store,
            dispatchers,
            model,
        })
    }

    pub fn settings(&self) -> &NotifySettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// 基础门控：全局开关
    fn base_can_handle(&self) -> bool {
        self.settings.enabled
    }

    /// 处理一次信号，返回按接收者顺序创建的通知
    #[instrument(skip_all, fields(handler = handler.name()))]
    pub async fn handle(
        &self,
        handler: &dyn NotificationHandler,
        signal_kwargs: SignalKwargs,
    ) -> Result<Vec<Notification>> {
        let ctx = HandlerContext::new(signal_kwargs);

        if !(self.base_can_handle() && handler.can_handle(&ctx)) {
            debug!("门控未通过，跳过处理");
            return Ok(Vec::new());
        }

        let recipients = handler.recipients(&ctx).await?;
        let source = TemplateSource::from_handler(handler, &ctx)?;

        let mut tx = self.store.begin().await?;
        let Some(template) = TemplateResolver::resolve(tx.as_mut(), &source).await? else {
            info!(source = ?source, "模板未激活，不创建通知");
            return Ok(Vec::new());
        };

        let dispatchers = unique_dispatchers(handler.dispatchers());
        let mut created = Vec::with_capacity(recipients.len());

        for recipient in recipients {
            if !handler.can_create_notification(&ctx, &recipient) {
                debug!(recipient = %recipient, "接收者未通过授权，跳过");
                continue;
            }

            let related_objects = handler
                .related_objects(&ctx)?
                .into_iter()
                .map(|(name, content_object)| RelatedObject {
                    name,
                    content_object,
                })
                .collect();

            let mut notification = Notification::new(
                self.model.label(),
                recipient,
                template.clone(),
                handler.extra_data(&ctx)?,
                related_objects,
            );
            self.model.prepare(&mut notification);
            tx.insert_notification(notification.clone()).await?;

            debug!(
                notification_id = %notification.id,
                recipient = %notification.recipient,
                "通知已创建"
            );

            self.dispatch(handler, &ctx, &notification, &dispatchers)
                .await?;
            created.push(notification);
        }

        tx.commit().await?;

        info!(
            template_id = %template.id,
            notifications = created.len(),
            "信号处理完成"
        );
        Ok(created)
    }

    /// 依次执行分发器，投递失败直接向上传播
    async fn dispatch(
        &self,
        handler: &dyn NotificationHandler,
        ctx: &HandlerContext,
        notification: &Notification,
        dispatchers: &[&'static str],
    ) -> Result<()> {
        for &name in dispatchers {
            if !handler.can_dispatch_notification(ctx, notification, name) {
                debug!(
                    notification_id = %notification.id,
                    dispatcher = name,
                    "分发未通过授权，跳过"
                );
                continue;
            }

            let dispatcher = self.dispatchers.instantiate(name)?;
            dispatcher.dispatch(notification).await?;
        }
        Ok(())
    }
}
