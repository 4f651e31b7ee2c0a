//! 通知数据模型
//!
//! 模板是不可变的内容包，分为两类：处理器按内联数据即时创建的模板
//! （按字段内容去重复用），以及由管理端维护、按 slug 引用的模板。
//! 通知绑定到一个模板，创建后核心不再修改或删除。

use chrono::{DateTime, Utc};
use notifykit_shared::events::EntityRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 模板附加字段与通知附加数据使用的 JSON 对象
pub type ExtraMap = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// TemplateData 模板内容
// ---------------------------------------------------------------------------

/// 模板内容
///
/// `title`、`text`、`trigger_action` 为必需字段，`extra_fields` 可选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    pub title: String,
    pub text: String,
    pub trigger_action: String,
    #[serde(default)]
    pub extra_fields: ExtraMap,
}

impl TemplateData {
    pub fn new(
        title: impl Into<String>,
        text: impl Into<String>,
        trigger_action: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            trigger_action: trigger_action.into(),
            extra_fields: ExtraMap::new(),
        }
    }

    pub fn with_extra_fields(mut self, extra_fields: ExtraMap) -> Self {
        self.extra_fields = extra_fields;
        self
    }
}

// ---------------------------------------------------------------------------
// NotificationTemplate 通知模板
// ---------------------------------------------------------------------------

/// 通知模板记录
///
/// `slug` 为空表示处理器即时创建的模板；非空表示该模板是某个
/// 管理模板的内容载体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: Uuid,
    pub title: String,
    pub text: String,
    pub trigger_action: String,
    pub extra_fields: ExtraMap,
    pub slug: Option<String>,
}

impl NotificationTemplate {
    /// 由内联数据创建模板
    pub fn from_data(data: TemplateData) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: data.title,
            text: data.text,
            trigger_action: data.trigger_action,
            extra_fields: data.extra_fields,
            slug: None,
        }
    }

    /// 复制管理模板的字段创建其内容载体
    pub fn from_admin(admin: &AdminNotificationTemplate) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: admin.title.clone(),
            text: admin.text.clone(),
            trigger_action: admin.trigger_action.clone(),
            extra_fields: admin.extra_fields.clone(),
            slug: Some(admin.slug.clone()),
        }
    }

    /// 是否为可复用的等价内联模板：slug 为空且各字段相等
    pub fn matches(&self, data: &TemplateData) -> bool {
        self.slug.is_none()
            && self.title == data.title
            && self.text == data.text
            && self.trigger_action == data.trigger_action
            && self.extra_fields == data.extra_fields
    }

    /// 用管理模板的最新字段覆盖自身内容
    pub fn sync_from(&mut self, admin: &AdminNotificationTemplate) {
        self.title = admin.title.clone();
        self.text = admin.text.clone();
        self.trigger_action = admin.trigger_action.clone();
        self.extra_fields = admin.extra_fields.clone();
    }
}

// ---------------------------------------------------------------------------
// AdminNotificationTemplate 管理模板
// ---------------------------------------------------------------------------

/// 管理端维护的模板
///
/// 通过 slug 被处理器引用；`is_active` 为 false 时，引用它的处理器
/// 不创建任何通知。`template_id` 指向首次使用时惰性创建的内容载体。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminNotificationTemplate {
    pub slug: String,
    pub title: String,
    pub text: String,
    pub trigger_action: String,
    pub extra_fields: ExtraMap,
    pub is_active: bool,
    pub template_id: Option<Uuid>,
}

impl AdminNotificationTemplate {
    pub fn new(slug: impl Into<String>, data: TemplateData) -> Self {
        Self {
            slug: slug.into(),
            title: data.title,
            text: data.text,
            trigger_action: data.trigger_action,
            extra_fields: data.extra_fields,
            is_active: true,
            template_id: None,
        }
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }
}

// ---------------------------------------------------------------------------
// Notification 通知
// ---------------------------------------------------------------------------

/// 通知的具名关联对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedObject {
    pub name: String,
    pub content_object: EntityRef,
}

/// 一条投递给接收者的通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    /// 创建该通知时使用的通知模型名称
    pub model: String,
    pub recipient: EntityRef,
    pub template: NotificationTemplate,
    pub extra_data: ExtraMap,
    pub related_objects: Vec<RelatedObject>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        model: impl Into<String>,
        recipient: EntityRef,
        template: NotificationTemplate,
        extra_data: ExtraMap,
        related_objects: Vec<RelatedObject>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            model: model.into(),
            recipient,
            template,
            extra_data,
            related_objects,
            created_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.template.title
    }

    pub fn text(&self) -> &str {
        &self.template.text
    }

    pub fn trigger_action(&self) -> &str {
        &self.template.trigger_action
    }

    pub fn extra_fields(&self) -> &ExtraMap {
        &self.template.extra_fields
    }

    /// 按名称查找关联对象，同名时取第一个
    pub fn related_object(&self, name: &str) -> Option<&EntityRef> {
        self.related_objects
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.content_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hello_data() -> TemplateData {
        let mut extra = ExtraMap::new();
        extra.insert("abc".to_string(), json!("def"));
        TemplateData::new("Hello title!", "Hello text!", "http://localhost").with_extra_fields(extra)
    }

    #[test]
    fn test_template_matches_same_fields() {
        let template = NotificationTemplate::from_data(hello_data());
        assert!(template.matches(&hello_data()));

        let mut other = hello_data();
        other.extra_fields.insert("abc".to_string(), json!("xyz"));
        assert!(!template.matches(&other));
    }

    #[test]
    fn test_admin_backed_template_never_matches_inline_data() {
        let admin = AdminNotificationTemplate::new("test_slug", hello_data());
        let template = NotificationTemplate::from_admin(&admin);
        assert_eq!(template.slug.as_deref(), Some("test_slug"));
        assert!(!template.matches(&hello_data()));
    }

    #[test]
    fn test_template_data_requires_core_fields() {
        let parsed: Result<TemplateData, _> =
            serde_json::from_value(json!({"title": "t", "text": "x"}));
        assert!(parsed.is_err());

        let parsed: TemplateData =
            serde_json::from_value(json!({"title": "t", "text": "x", "trigger_action": "/"}))
                .unwrap();
        assert!(parsed.extra_fields.is_empty());
    }

    #[test]
    fn test_notification_accessors() {
        let article = EntityRef::new("articles.Article", "3");
        let notification = Notification::new(
            "notifykit.Notification",
            EntityRef::new("auth.User", "1"),
            NotificationTemplate::from_data(hello_data()),
            ExtraMap::new(),
            vec![RelatedObject {
                name: "article".to_string(),
                content_object: article.clone(),
            }],
        );

        assert_eq!(notification.title(), "Hello title!");
        assert_eq!(notification.trigger_action(), "http://localhost");
        assert_eq!(notification.extra_fields()["abc"], "def");
        assert_eq!(notification.related_object("article"), Some(&article));
        assert!(notification.related_object("missing").is_none());
    }
}
