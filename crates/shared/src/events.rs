//! 信号与实体引用模型
//!
//! 定义应用代码发出的信号标识、信号发送方类型、信号参数以及
//! 通知中引用任意业务实体的统一方式。信号参数以 JSON 对象承载，
//! 核心管道不关心其结构，由各处理器按需解析自己关心的字段。

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};

/// 信号参数
pub type SignalKwargs = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Signal 信号标识
// ---------------------------------------------------------------------------

/// 信号标识
///
/// 信号以名称作为身份，同名信号视为同一个信号，因此可以安全地
/// 跨进程序列化后在后台任务中重建。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signal(Cow<'static, str>);

impl Signal {
    /// 以静态名称定义信号，可用于常量
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SenderType 信号发送方类型
// ---------------------------------------------------------------------------

/// 信号发送方类型
///
/// 对应发出信号的业务实体类型（如 `articles.Comment`），
/// 处理器可以声明只接受特定发送方的信号。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderType(Cow<'static, str>);

impl SenderType {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityRef 实体引用
// ---------------------------------------------------------------------------

/// 任意业务实体的引用
///
/// 由实体类型与主键组成身份，`attributes` 携带渲染时可能用到的
/// 附加属性（如 `get_absolute_url`），是否允许在模板中访问由渲染层决定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// 附加一个可供渲染的属性
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    /// 是否指向同一实体（忽略附加属性）
    pub fn same_entity(&self, other: &EntityRef) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

// ---------------------------------------------------------------------------
// 信号参数解析
// ---------------------------------------------------------------------------

/// 从信号参数中取出指定键并反序列化
///
/// 键不存在时返回 `None`，类型不匹配时返回 [`NotifyError::InvalidKwarg`]
pub fn kwarg<T: DeserializeOwned>(kwargs: &SignalKwargs, key: &str) -> Result<Option<T>> {
    kwargs
        .get(key)
        .map(|value| {
            serde_json::from_value(value.clone()).map_err(|e| NotifyError::InvalidKwarg {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

/// 与 [`kwarg`] 相同，但键缺失时视为错误
pub fn required_kwarg<T: DeserializeOwned>(kwargs: &SignalKwargs, key: &str) -> Result<T> {
    kwarg(kwargs, key)?.ok_or_else(|| NotifyError::InvalidKwarg {
        key: key.to_string(),
        message: "缺少必需的信号参数".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COMMENT_CREATED: Signal = Signal::from_static("comment_created");

    #[test]
    fn test_signal_identity_by_name() {
        assert_eq!(COMMENT_CREATED, Signal::new("comment_created"));
        assert_ne!(COMMENT_CREATED, Signal::new("comment_deleted"));
        assert_eq!(COMMENT_CREATED.to_string(), "comment_created");
    }

    #[test]
    fn test_entity_ref_serialization() {
        let article = EntityRef::new("articles.Article", "7")
            .with_attribute("get_absolute_url", json!("/articles/7/"));

        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["kind"], "articles.Article");
        assert_eq!(value["attributes"]["get_absolute_url"], "/articles/7/");

        let plain = serde_json::to_value(EntityRef::new("auth.User", "1")).unwrap();
        assert!(plain.get("attributes").is_none());
    }

    #[test]
    fn test_same_entity_ignores_attributes() {
        let a = EntityRef::new("auth.User", "1");
        let b = EntityRef::new("auth.User", "1").with_attribute("username", json!("Jack"));
        assert!(a.same_entity(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_kwarg_parsing() {
        let mut kwargs = SignalKwargs::new();
        kwargs.insert("can_handle".to_string(), json!(false));
        kwargs.insert("count".to_string(), json!("not a number"));

        assert_eq!(kwarg::<bool>(&kwargs, "can_handle").unwrap(), Some(false));
        assert_eq!(kwarg::<bool>(&kwargs, "missing").unwrap(), None);

        let err = kwarg::<u32>(&kwargs, "count").unwrap_err();
        assert_eq!(err.code(), "INVALID_KWARG");

        let err = required_kwarg::<bool>(&kwargs, "missing").unwrap_err();
        assert!(matches!(err, NotifyError::InvalidKwarg { ref key, .. } if key == "missing"));
    }
}
