//! 通知渲染
//!
//! 将通知模板中的 `{{ path }}` 占位符替换为通知上下文中的值，支持的路径：
//!
//! - `recipient`、`recipient.id`、`recipient.kind`、`recipient.<attr>`
//! - `extra_data.<key>[.<key>...]`
//! - `extra_fields.<key>[.<key>...]`
//! - `related.<name>`、`related.<name>.<attr>`（属性需在允许列表中）
//!
//! ```ignore
//! let renderer = NotificationRenderer::new(RenderSettings::from(&settings))?;
//! let rendered = renderer.render(&notification)?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use notifykit_core::models::{ExtraMap, Notification};
use notifykit_shared::config::NotifySettings;
use notifykit_shared::events::EntityRef;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::error::WorkerError;

/// 渲染相关的配置
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderSettings {
    /// 拼接在每个模板字符串之前
    pub prefix: String,
    /// 未解析的占位符视为错误
    pub check: bool,
    pub strip_html: bool,
    /// 渲染前先翻译原始模板字符串
    pub translate: bool,
    /// 关联对象允许访问的属性
    pub allowed_attributes: BTreeSet<String>,
}

impl From<&NotifySettings> for RenderSettings {
    fn from(settings: &NotifySettings) -> Self {
        Self {
            prefix: settings.template_prefix.clone(),
            check: settings.template_check,
            strip_html: settings.strip_html,
            translate: settings.template_translate,
            allowed_attributes: settings.related_objects_allowed_attributes.clone(),
        }
    }
}

/// 模板字符串翻译
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str) -> String;
}

/// 原样返回
#[derive(Debug, Default)]
pub struct IdentityTranslator;

impl Translator for IdentityTranslator {
    fn translate(&self, text: &str) -> String {
        text.to_string()
    }
}

/// 渲染后的通知，发送器直接使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedNotification {
    pub notification_id: Uuid,
    pub recipient: EntityRef,
    pub title: String,
    pub text: String,
    pub trigger_action: String,
    pub extra_fields: ExtraMap,
}

/// 通知渲染器
pub struct NotificationRenderer {
    settings: RenderSettings,
    translator: Arc<dyn Translator>,
    placeholder_regex: Regex,
    tag_regex: Regex,
}

impl NotificationRenderer {
    pub fn new(settings: RenderSettings) -> Result<Self, WorkerError> {
        Ok(Self {
            settings,
            translator: Arc::new(IdentityTranslator),
            // 匹配 {{ path }}，路径由字母、数字、下划线和点组成
            placeholder_regex: compile(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}")?,
            tag_regex: compile(r"<[^>]*>")?,
        })
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// 渲染通知的标题、正文、触发动作和字符串类型的扩展字段
    pub fn render(&self, notification: &Notification) -> Result<RenderedNotification, WorkerError> {
        let mut extra_fields = ExtraMap::new();
        for (key, value) in notification.extra_fields() {
            let rendered = match value {
                Value::String(raw) => Value::String(self.render_str(raw, notification)?),
                other => other.clone(),
            };
            extra_fields.insert(key.clone(), rendered);
        }

        Ok(RenderedNotification {
            notification_id: notification.id,
            recipient: notification.recipient.clone(),
            title: self.render_str(notification.title(), notification)?,
            text: self.render_str(notification.text(), notification)?,
            trigger_action: self.render_str(notification.trigger_action(), notification)?,
            extra_fields,
        })
    }

    /// 渲染单个模板字符串
    pub fn render_str(&self, raw: &str, notification: &Notification) -> Result<String, WorkerError> {
        let raw = if self.settings.translate {
            self.translator.translate(raw)
        } else {
            raw.to_string()
        };
        let source = format!("{}{}", self.settings.prefix, raw);

        let mut unresolved = Vec::new();
        let rendered = self
            .placeholder_regex
            .replace_all(&source, |caps: &Captures| {
                let path = &caps[1];
                match self.lookup(notification, path) {
                    Some(value) => value,
                    None => {
                        unresolved.push(path.to_string());
                        String::new()
                    }
                }
            })
            .into_owned();

        if !unresolved.is_empty() {
            if self.settings.check {
                return Err(WorkerError::TemplateRender(format!(
                    "未解析的占位符: {}",
                    unresolved.join(", ")
                )));
            }
            warn!(
                notification_id = %notification.id,
                placeholders = ?unresolved,
                "模板占位符未解析，按空字符串渲染"
            );
        }

        if self.settings.strip_html {
            return Ok(self.tag_regex.replace_all(&rendered, "").into_owned());
        }
        Ok(rendered)
    }

    fn lookup(&self, notification: &Notification, path: &str) -> Option<String> {
        let segments: Vec<&str> = path.split('.').collect();
        match segments.as_slice() {
            ["recipient"] => Some(notification.recipient.to_string()),
            ["recipient", attr] => entity_field(&notification.recipient, attr),
            ["extra_data", rest @ ..] if !rest.is_empty() => {
                walk(notification.extra_data.get(rest[0])?, &rest[1..])
            }
            ["extra_fields", rest @ ..] if !rest.is_empty() => {
                walk(notification.extra_fields().get(rest[0])?, &rest[1..])
            }
            ["related", name] => notification.related_object(name).map(ToString::to_string),
            ["related", name, attr] => {
                if !self.settings.allowed_attributes.contains(*attr) {
                    return None;
                }
                notification
                    .related_object(name)?
                    .attribute(attr)
                    .map(display_value)
            }
            _ => None,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, WorkerError> {
    Regex::new(pattern).map_err(|e| WorkerError::TemplateRender(format!("无效的正则: {e}")))
}

fn entity_field(entity: &EntityRef, attr: &str) -> Option<String> {
    match attr {
        "id" => Some(entity.id.clone()),
        "kind" => Some(entity.kind.clone()),
        other => entity.attribute(other).map(display_value),
    }
}

fn walk(value: &Value, rest: &[&str]) -> Option<String> {
    let mut current = value;
    for key in rest {
        current = match current {
            Value::Object(map) => map.get(*key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(display_value(current))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifykit_core::models::{NotificationTemplate, RelatedObject, TemplateData};
    use serde_json::json;

    fn notification(title: &str, text: &str) -> Notification {
        let mut extra_fields = ExtraMap::new();
        extra_fields.insert("cta".to_string(), json!("查看 {{ extra_data.article.title }}"));
        extra_fields.insert("priority".to_string(), json!(2));

        let mut extra_data = ExtraMap::new();
        extra_data.insert("article".to_string(), json!({"title": "Rust 入门", "tags": ["a", "b"]}));
        extra_data.insert("count".to_string(), json!(3));

        let article = EntityRef::new("articles.Article", "42")
            .with_attribute("get_absolute_url", json!("/articles/42/"))
            .with_attribute("secret", json!("hidden"));

        Notification::new(
            "notifykit.Notification",
            EntityRef::new("auth.User", "7").with_attribute("username", json!("Jack")),
            NotificationTemplate::from_data(
                TemplateData::new(title, text, "{{ related.article.get_absolute_url }}")
                    .with_extra_fields(extra_fields),
            ),
            extra_data,
            vec![RelatedObject {
                name: "article".to_string(),
                content_object: article,
            }],
        )
    }

    fn renderer(settings: RenderSettings) -> NotificationRenderer {
        NotificationRenderer::new(RenderSettings {
            allowed_attributes: BTreeSet::from(["get_absolute_url".to_string()]),
            ..settings
        })
        .unwrap()
    }

    #[test]
    fn test_render_placeholders() {
        let n = notification(
            "你好 {{ recipient.username }}",
            "{{extra_data.article.title}} 有 {{ extra_data.count }} 条新评论，标签 {{ extra_data.article.tags.1 }}",
        );
        let rendered = renderer(RenderSettings::default()).render(&n).unwrap();

        assert_eq!(rendered.title, "你好 Jack");
        assert_eq!(rendered.text, "Rust 入门 有 3 条新评论，标签 b");
        assert_eq!(rendered.trigger_action, "/articles/42/");
        assert_eq!(rendered.extra_fields["cta"], "查看 Rust 入门");
        assert_eq!(rendered.extra_fields["priority"], 2);
        assert_eq!(rendered.notification_id, n.id);
    }

    #[test]
    fn test_related_object_and_recipient_identity() {
        let n = notification("{{ related.article }}", "{{ recipient }} / {{ recipient.id }}");
        let rendered = renderer(RenderSettings::default()).render(&n).unwrap();

        assert_eq!(rendered.title, "articles.Article#42");
        assert_eq!(rendered.text, "auth.User#7 / 7");
    }

    #[test]
    fn test_disallowed_attribute_renders_empty() {
        let n = notification("[{{ related.article.secret }}]", "x");
        let rendered = renderer(RenderSettings::default()).render(&n).unwrap();
        assert_eq!(rendered.title, "[]");
    }

    #[test]
    fn test_template_check_rejects_unresolved() {
        let n = notification("{{ extra_data.missing }}", "x");
        let err = renderer(RenderSettings {
            check: true,
            ..Default::default()
        })
        .render(&n)
        .unwrap_err();
        assert!(matches!(err, WorkerError::TemplateRender(msg) if msg.contains("extra_data.missing")));
    }

    #[test]
    fn test_prefix_and_strip_html() {
        let n = notification("<b>{{ recipient.username }}</b>", "<p>hi</p>");
        let rendered = renderer(RenderSettings {
            prefix: "[站内信] ".to_string(),
            strip_html: true,
            ..Default::default()
        })
        .render(&n)
        .unwrap();

        assert_eq!(rendered.title, "[站内信] Jack");
        assert_eq!(rendered.text, "[站内信] hi");
    }

    struct Chinese;

    impl Translator for Chinese {
        fn translate(&self, text: &str) -> String {
            text.replace("hello", "你好")
        }
    }

    #[test]
    fn test_translate_runs_before_substitution() {
        let n = notification("hello {{ recipient.username }}", "hello");

        let rendered = renderer(RenderSettings::default())
            .with_translator(Arc::new(Chinese))
            .render(&n)
            .unwrap();
        assert_eq!(rendered.title, "hello Jack");

        let rendered = renderer(RenderSettings {
            translate: true,
            ..Default::default()
        })
        .with_translator(Arc::new(Chinese))
        .render(&n)
        .unwrap();
        assert_eq!(rendered.title, "你好 Jack");
        assert_eq!(rendered.text, "你好");
    }

    #[test]
    fn test_settings_from_notify_settings() {
        let settings = NotifySettings {
            template_prefix: "p".to_string(),
            template_check: true,
            strip_html: true,
            ..Default::default()
        };
        let render = RenderSettings::from(&settings);
        assert_eq!(render.prefix, "p");
        assert!(render.check);
        assert!(render.strip_html);
        assert!(!render.translate);
        assert!(render.allowed_attributes.contains("get_absolute_url"));
    }
}
