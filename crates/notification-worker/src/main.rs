//! 通知工作者服务
//!
//! 组装通知中心与后台任务队列，演示从信号到多渠道投递的完整链路。

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use notifykit_core::NotificationCenter;
use notifykit_core::autoload::HandlerCatalog;
use notifykit_core::dispatcher::{DispatcherRegistry, LogDispatcher, QueueDispatcher};
use notifykit_core::handler::{HandlerContext, NotificationHandler};
use notifykit_core::models::{AdminNotificationTemplate, ExtraMap, TemplateData};
use notifykit_core::queue::task_queue;
use notifykit_core::registry::{HandlerMeta, SignalRegistry};
use notifykit_core::store::{MemoryStore, NotificationStore};
use notifykit_shared::config::AppConfig;
use notifykit_shared::error::Result as NotifyResult;
use notifykit_shared::events::{EntityRef, SenderType, Signal};
use notifykit_shared::observability;
use notifykit_worker::consumer::NotificationWorker;
use notifykit_worker::sender::{AppPushSender, EmailSender, NotificationSender};
use notifykit_worker::templates::{NotificationRenderer, RenderSettings};
use serde_json::json;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

const DEMO_MODULE: &str = "demo.articles";
const ARTICLE_PUBLISHED: Signal = Signal::from_static("article_published");
const ARTICLE_SENDER: SenderType = SenderType::from_static("articles.Article");

/// 文章发布后通知订阅者
#[derive(Default)]
struct ArticlePublishedHandler;

#[async_trait]
impl NotificationHandler for ArticlePublishedHandler {
    fn meta() -> Option<HandlerMeta> {
        Some(HandlerMeta::for_signal(ARTICLE_PUBLISHED).with_allowed_senders([ARTICLE_SENDER]))
    }

    fn dispatchers(&self) -> Vec<&'static str> {
        vec![LogDispatcher::NAME, QueueDispatcher::NAME]
    }

    fn template_slug(&self) -> Option<&str> {
        Some("article_published")
    }

    async fn recipients(&self, ctx: &HandlerContext) -> NotifyResult<Vec<EntityRef>> {
        ctx.required_kwarg("subscribers")
    }

    fn extra_data(&self, ctx: &HandlerContext) -> NotifyResult<ExtraMap> {
        let title: String = ctx.required_kwarg("title")?;
        Ok(ExtraMap::from_iter([("title".to_string(), json!(title))]))
    }

    fn related_objects(&self, ctx: &HandlerContext) -> NotifyResult<BTreeMap<String, EntityRef>> {
        let article: EntityRef = ctx.required_kwarg("article")?;
        Ok(BTreeMap::from([("article".to_string(), article)]))
    }
}

fn register_demo_handlers(registry: &mut SignalRegistry) -> NotifyResult<()> {
    registry.register::<ArticlePublishedHandler>()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置并初始化日志
    let mut config = AppConfig::load("notification-worker").unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    observability::init(&config.observability)?;

    info!(environment = %config.environment, "Starting notification-worker...");

    if config.notify.autoload_modules.is_empty() {
        config.notify.autoload_modules.push(DEMO_MODULE.to_string());
    }

    // 2. 存储与管理模板
    let store = MemoryStore::new();
    let admin_template = AdminNotificationTemplate::new(
        "article_published",
        TemplateData::new(
            "{{ recipient.username }}，你关注的作者发布了新文章",
            "<p>{{ extra_data.title }}</p>",
            "{{ related.article.get_absolute_url }}",
        ),
    );
    store.save_admin_template(admin_template).await?;

    // 3. 后台任务队列与分发器
    let (queue, queue_rx) = task_queue(config.notify.queue_capacity);
    let mut dispatchers = DispatcherRegistry::new();
    dispatchers
        .register(LogDispatcher::NAME, || Arc::new(LogDispatcher))
        .register_instance(Arc::new(QueueDispatcher::new(queue.clone())));

    // 4. 通知中心
    let center = NotificationCenter::builder(config.notify.clone())
        .catalog(HandlerCatalog::new().module(DEMO_MODULE, register_demo_handlers))
        .dispatchers(dispatchers)
        .queue(queue)
        .build(Arc::new(store.clone()))?;

    // 5. 工作者
    let renderer = NotificationRenderer::new(RenderSettings::from(&config.notify))?;
    let senders: Vec<Arc<dyn NotificationSender>> =
        vec![Arc::new(AppPushSender), Arc::new(EmailSender)];
    let worker = NotificationWorker::new(center.clone(), renderer, senders);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(queue_rx, shutdown_rx));

    // 6. 发出演示信号
    let subscriber = EntityRef::new("auth.User", "1")
        .with_attribute("username", json!("Jack"))
        .with_attribute("email", json!("jack@example.com"));
    let article = EntityRef::new("articles.Article", "42")
        .with_attribute("get_absolute_url", json!("/articles/42/"));

    let mut kwargs = serde_json::Map::new();
    kwargs.insert("subscribers".to_string(), json!([subscriber]));
    kwargs.insert("article".to_string(), serde_json::to_value(&article)?);
    kwargs.insert("title".to_string(), json!("Rust 异步入门"));

    let outcomes = center
        .send(&ARTICLE_PUBLISHED, Some(&ARTICLE_SENDER), kwargs)
        .await?;
    info!(
        receiver = center.receiver().name(),
        handlers = outcomes.len(),
        "Demo signal sent"
    );

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    match worker_handle.await {
        Ok(Ok(())) => info!("Service shutdown complete"),
        Ok(Err(e)) => error!(error = %e, "通知工作者异常退出"),
        Err(e) => error!(error = %e, "通知工作者任务失败"),
    }

    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
