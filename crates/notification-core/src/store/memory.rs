//! 内存存储
//!
//! 基于读写锁的内存实现，适用于测试和开发环境。锁只在同步代码段内
//! 持有，不跨越 await 点。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use notifykit_shared::error::{NotifyError, Result};
use notifykit_shared::events::EntityRef;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{NotificationStore, StoreTransaction};
use crate::models::{AdminNotificationTemplate, Notification, NotificationTemplate, TemplateData};

#[derive(Debug, Default)]
struct MemoryState {
    templates: Vec<NotificationTemplate>,
    admin_templates: HashMap<String, AdminNotificationTemplate>,
    notifications: Vec<Notification>,
}

/// 通用内存存储
///
/// 克隆得到的实例共享同一份数据
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交的模板数量
    pub fn template_count(&self) -> usize {
        self.state.read().templates.len()
    }

    /// 已提交的通知数量
    pub fn notification_count(&self) -> usize {
        self.state.read().notifications.len()
    }

    /// 删除指定接收者的全部通知
    pub fn clear_notifications_for(&self, recipient: &EntityRef) {
        self.state
            .write()
            .notifications
            .retain(|n| !n.recipient.same_entity(recipient));
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            templates: Vec::new(),
            admin_links: Vec::new(),
            notifications: Vec::new(),
        }))
    }

    async fn save_admin_template(&self, mut template: AdminNotificationTemplate) -> Result<()> {
        let mut state = self.state.write();

        // 保留已有的内容载体关联，避免覆盖写入时丢失
        if template.template_id.is_none()
            && let Some(existing) = state.admin_templates.get(&template.slug)
        {
            template.template_id = existing.template_id;
        }

        if let Some(template_id) = template.template_id {
            if let Some(content) = state.templates.iter_mut().find(|t| t.id == template_id) {
                content.sync_from(&template);
            }
            // 通知通过模板读取标题与正文，已有通知同样看到最新内容
            let mut synced = 0usize;
            for notification in state
                .notifications
                .iter_mut()
                .filter(|n| n.template.id == template_id)
            {
                notification.template.sync_from(&template);
                synced += 1;
            }
            debug!(slug = %template.slug, notifications = synced, "已同步管理模板内容");
        }

        state.admin_templates.insert(template.slug.clone(), template);
        Ok(())
    }

    async fn admin_template(&self, slug: &str) -> Result<Option<AdminNotificationTemplate>> {
        Ok(self.state.read().admin_templates.get(slug).cloned())
    }

    async fn templates(&self) -> Result<Vec<NotificationTemplate>> {
        Ok(self.state.read().templates.clone())
    }

    async fn notifications_for(&self, recipient: &EntityRef) -> Result<Vec<Notification>> {
        Ok(self
            .state
            .read()
            .notifications
            .iter()
            .filter(|n| n.recipient.same_entity(recipient))
            .cloned()
            .collect())
    }

    async fn notification(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self
            .state
            .read()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }
}

/// 内存事务：写入先暂存，提交时一次性合并
struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    templates: Vec<NotificationTemplate>,
    admin_links: Vec<(String, Uuid)>,
    notifications: Vec<Notification>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_template(&mut self, data: &TemplateData) -> Result<Option<NotificationTemplate>> {
        if let Some(staged) = self.templates.iter().find(|t| t.matches(data)) {
            return Ok(Some(staged.clone()));
        }
        Ok(self
            .state
            .read()
            .templates
            .iter()
            .find(|t| t.matches(data))
            .cloned())
    }

    async fn template(&mut self, id: Uuid) -> Result<Option<NotificationTemplate>> {
        if let Some(staged) = self.templates.iter().find(|t| t.id == id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self
            .state
            .read()
            .templates
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn insert_template(&mut self, template: NotificationTemplate) -> Result<()> {
        self.templates.push(template);
        Ok(())
    }

    async fn admin_template(&mut self, slug: &str) -> Result<Option<AdminNotificationTemplate>> {
        let mut admin = self.state.read().admin_templates.get(slug).cloned();
        if let Some(admin) = admin.as_mut()
            && let Some((_, template_id)) = self.admin_links.iter().rev().find(|(s, _)| s == slug)
        {
            admin.template_id = Some(*template_id);
        }
        Ok(admin)
    }

    async fn link_admin_template(&mut self, slug: &str, template_id: Uuid) -> Result<()> {
        if !self.state.read().admin_templates.contains_key(slug) {
            return Err(NotifyError::NotFound {
                entity: "AdminNotificationTemplate".to_string(),
                id: slug.to_string(),
            });
        }
        self.admin_links.push((slug.to_string(), template_id));
        Ok(())
    }

    async fn insert_notification(&mut self, notification: Notification) -> Result<()> {
        self.notifications.push(notification);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let mut state = this.state.write();

        debug!(
            templates = this.templates.len(),
            notifications = this.notifications.len(),
            "提交内存事务"
        );

        state.templates.extend(this.templates);
        for (slug, template_id) in this.admin_links {
            // 并发事务可能已完成关联，保留先提交者
            if let Some(admin) = state.admin_templates.get_mut(&slug)
                && admin.template_id.is_none()
            {
                admin.template_id = Some(template_id);
            }
        }
        state.notifications.extend(this.notifications);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtraMap;

    fn data() -> TemplateData {
        TemplateData::new("title", "text", "/")
    }

    fn notification(recipient: &EntityRef) -> Notification {
        Notification::new(
            "notifykit.Notification",
            recipient.clone(),
            NotificationTemplate::from_data(data()),
            ExtraMap::new(),
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_rolled_back() {
        let store = MemoryStore::new();
        let user = EntityRef::new("auth.User", "1");

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_template(NotificationTemplate::from_data(data()))
                .await
                .unwrap();
            tx.insert_notification(notification(&user)).await.unwrap();
            // 未提交直接丢弃
        }

        assert_eq!(store.template_count(), 0);
        assert_eq!(store.notification_count(), 0);
    }

    #[tokio::test]
    async fn test_transaction_reads_its_own_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let template = NotificationTemplate::from_data(data());
        tx.insert_template(template.clone()).await.unwrap();

        assert_eq!(tx.find_template(&data()).await.unwrap(), Some(template.clone()));
        assert_eq!(tx.template(template.id).await.unwrap(), Some(template));

        tx.commit().await.unwrap();
        assert_eq!(store.template_count(), 1);
    }

    #[tokio::test]
    async fn test_save_admin_template_syncs_linked_content() {
        let store = MemoryStore::new();
        store
            .save_admin_template(AdminNotificationTemplate::new("welcome", data()))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let admin = tx.admin_template("welcome").await.unwrap().unwrap();
        let content = NotificationTemplate::from_admin(&admin);
        let content_id = content.id;
        tx.insert_template(content).await.unwrap();
        tx.link_admin_template("welcome", content_id).await.unwrap();
        assert_eq!(
            tx.admin_template("welcome").await.unwrap().unwrap().template_id,
            Some(content_id)
        );
        tx.commit().await.unwrap();

        let mut updated = store.admin_template("welcome").await.unwrap().unwrap();
        updated.title = "new title".to_string();
        updated.template_id = None;
        store.save_admin_template(updated).await.unwrap();

        let admin = store.admin_template("welcome").await.unwrap().unwrap();
        assert_eq!(admin.template_id, Some(content_id));
        let templates = store.templates().await.unwrap();
        assert_eq!(templates[0].title, "new title");
    }

    #[tokio::test]
    async fn test_save_admin_template_syncs_existing_notifications() {
        let store = MemoryStore::new();
        let user = EntityRef::new("auth.User", "1");
        store
            .save_admin_template(AdminNotificationTemplate::new("welcome", data()))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let admin = tx.admin_template("welcome").await.unwrap().unwrap();
        let content = NotificationTemplate::from_admin(&admin);
        tx.insert_template(content.clone()).await.unwrap();
        tx.link_admin_template("welcome", content.id).await.unwrap();
        let linked = Notification::new(
            "notifykit.Notification",
            user.clone(),
            content,
            ExtraMap::new(),
            Vec::new(),
        );
        tx.insert_notification(linked.clone()).await.unwrap();
        tx.insert_notification(notification(&user)).await.unwrap();
        tx.commit().await.unwrap();

        let mut updated = store.admin_template("welcome").await.unwrap().unwrap();
        updated.title = "Edited".to_string();
        store.save_admin_template(updated).await.unwrap();

        let stored = store.notification(linked.id).await.unwrap().unwrap();
        assert_eq!(stored.title(), "Edited");
        assert_eq!(stored.template.id, linked.template.id);

        // 内联模板的通知不受影响
        let titles: Vec<String> = store
            .notifications_for(&user)
            .await
            .unwrap()
            .iter()
            .map(|n| n.title().to_string())
            .collect();
        assert_eq!(titles, vec!["Edited".to_string(), "title".to_string()]);
    }

    #[tokio::test]
    async fn test_link_unknown_admin_template_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .link_admin_template("missing", Uuid::now_v7())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_notifications_for_recipient() {
        let store = MemoryStore::new();
        let jack = EntityRef::new("auth.User", "1");
        let john = EntityRef::new("auth.User", "2");

        let mut tx = store.begin().await.unwrap();
        tx.insert_notification(notification(&jack)).await.unwrap();
        tx.insert_notification(notification(&john)).await.unwrap();
        tx.insert_notification(notification(&jack)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.notifications_for(&jack).await.unwrap().len(), 2);
        store.clear_notifications_for(&jack);
        assert!(store.notifications_for(&jack).await.unwrap().is_empty());
        assert_eq!(store.notification_count(), 1);
    }
}
