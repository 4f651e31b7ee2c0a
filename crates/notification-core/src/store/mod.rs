//! 持久化边界
//!
//! 核心只通过这里的窄接口读写模板与通知，具体的表结构由宿主的
//! 持久化层负责。一次处理器调用中的模板与通知写入都在同一个
//! [`StoreTransaction`] 内完成，未提交即丢弃。

mod memory;

use async_trait::async_trait;
use notifykit_shared::error::Result;
use notifykit_shared::events::EntityRef;
use uuid::Uuid;

use crate::models::{AdminNotificationTemplate, Notification, NotificationTemplate, TemplateData};

pub use memory::MemoryStore;

/// 通知存储
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// 开启一个事务
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// 新增或更新管理模板（按 slug），同步已关联内容载体及引用它的通知
    async fn save_admin_template(&self, template: AdminNotificationTemplate) -> Result<()>;

    async fn admin_template(&self, slug: &str) -> Result<Option<AdminNotificationTemplate>>;

    /// 所有已提交的模板
    async fn templates(&self) -> Result<Vec<NotificationTemplate>>;

    /// 指定接收者的通知，按创建顺序
    async fn notifications_for(&self, recipient: &EntityRef) -> Result<Vec<Notification>>;

    async fn notification(&self, id: Uuid) -> Result<Option<Notification>>;
}

/// 存储事务
///
/// 读操作能看到本事务内尚未提交的写入。事务对象被丢弃而未调用
/// [`commit`](StoreTransaction::commit) 时，所有写入都被回滚。
#[async_trait]
pub trait StoreTransaction: Send {
    /// 查找与内联数据等价（slug 为空且字段相等）的模板
    async fn find_template(&mut self, data: &TemplateData) -> Result<Option<NotificationTemplate>>;

    async fn template(&mut self, id: Uuid) -> Result<Option<NotificationTemplate>>;

    async fn insert_template(&mut self, template: NotificationTemplate) -> Result<()>;

    async fn admin_template(&mut self, slug: &str) -> Result<Option<AdminNotificationTemplate>>;

    /// 将管理模板关联到其内容载体
    async fn link_admin_template(&mut self, slug: &str, template_id: Uuid) -> Result<()>;

    /// 写入通知及其关联对象
    async fn insert_notification(&mut self, notification: Notification) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
