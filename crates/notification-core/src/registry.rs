//! 信号注册表
//!
//! 维护信号到处理器注册项的映射。注册表在启动阶段显式填充，
//! 之后以 `Arc<SignalRegistry>` 只读共享，运行期不再变更。
//!
//! ```text
//! signal "comment_created" ──► [(CommentHandler, None), (MentionHandler, [articles.Comment])]
//! signal "article_published" ─► [(ArticleHandler, None)]
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use notifykit_shared::error::{NotifyError, Result};
use notifykit_shared::events::{SenderType, Signal};
use tracing::{debug, info};

use crate::handler::NotificationHandler;

// ---------------------------------------------------------------------------
// HandlerMeta 处理器元数据
// ---------------------------------------------------------------------------

/// 处理器声明的信号绑定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalBinding {
    /// 未声明信号，非抽象处理器注册时报错
    Unset,
    /// 显式声明为空，跳过注册
    Disabled,
    Bound(Signal),
}

/// 处理器元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerMeta {
    pub signal: SignalBinding,
    /// 允许的信号发送方，`None` 表示不限制
    pub allowed_senders: Option<Vec<SenderType>>,
    pub is_abstract: bool,
}

impl HandlerMeta {
    /// 空元数据（未声明信号）
    pub fn empty() -> Self {
        Self {
            signal: SignalBinding::Unset,
            allowed_senders: None,
            is_abstract: false,
        }
    }

    pub fn for_signal(signal: Signal) -> Self {
        Self {
            signal: SignalBinding::Bound(signal),
            ..Self::empty()
        }
    }

    /// 信号显式为空的元数据，常用于基础处理器
    pub fn disabled() -> Self {
        Self {
            signal: SignalBinding::Disabled,
            ..Self::empty()
        }
    }

    /// 抽象处理器元数据，仅供其他处理器复用逻辑
    pub fn abstract_handler() -> Self {
        Self {
            is_abstract: true,
            ..Self::empty()
        }
    }

    pub fn with_allowed_senders(mut self, senders: impl IntoIterator<Item = SenderType>) -> Self {
        self.allowed_senders = Some(senders.into_iter().collect());
        self
    }

    /// 从声明式 JSON 解析元数据
    ///
    /// ```json
    /// {"signal": "comment_created", "allowed_senders": ["articles.Comment"], "abstract": false}
    /// ```
    ///
    /// `signal` 缺失与显式为 `null` 含义不同：前者未声明，后者跳过注册。
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| NotifyError::configuration("处理器元数据必须是 JSON 对象"))?;

        let signal = match map.get("signal") {
            None => SignalBinding::Unset,
            Some(serde_json::Value::Null) => SignalBinding::Disabled,
            Some(serde_json::Value::String(name)) => SignalBinding::Bound(Signal::new(name.clone())),
            Some(other) => {
                return Err(NotifyError::configuration(format!(
                    "signal 必须是信号名称，实际为 {other}"
                )));
            }
        };

        let allowed_senders = match map.get("allowed_senders") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| {
                        item.as_str().map(SenderType::new).ok_or_else(|| {
                            NotifyError::configuration(format!(
                                "allowed_senders 只能包含发送方类型名称，实际为 {item}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(other) => {
                return Err(NotifyError::configuration(format!(
                    "allowed_senders 必须是发送方类型集合，实际为 {other}"
                )));
            }
        };

        let is_abstract = match map.get("abstract") {
            None => false,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(NotifyError::configuration(format!(
                    "abstract 必须是布尔值，实际为 {other}"
                )));
            }
        };

        Ok(Self {
            signal,
            allowed_senders,
            is_abstract,
        })
    }
}

// ---------------------------------------------------------------------------
// HandlerType 处理器类型
// ---------------------------------------------------------------------------

/// 处理器类型：类型身份加实例工厂
///
/// 相等性只比较类型身份
#[derive(Clone, Copy)]
pub struct HandlerType {
    type_id: TypeId,
    name: &'static str,
    factory: fn() -> Box<dyn NotificationHandler>,
}

fn build_handler<H: NotificationHandler + Default + 'static>() -> Box<dyn NotificationHandler> {
    Box::new(H::default())
}

impl HandlerType {
    pub fn of<H: NotificationHandler + Default + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            name: std::any::type_name::<H>(),
            factory: build_handler::<H>,
        }
    }

    /// 完整类型路径
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 去掉模块路径的类型名
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }

    /// 为一次信号处理创建新的处理器实例
    pub fn instantiate(&self) -> Box<dyn NotificationHandler> {
        (self.factory)()
    }
}

impl PartialEq for HandlerType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for HandlerType {}

impl fmt::Debug for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// 注册项：处理器类型与允许的发送方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRegistration {
    pub handler: HandlerType,
    pub allowed_senders: Option<Vec<SenderType>>,
}

impl HandlerRegistration {
    /// 发送方是否通过过滤；未限制发送方时总是通过
    pub fn accepts(&self, sender: Option<&SenderType>) -> bool {
        match (&self.allowed_senders, sender) {
            (None, _) => true,
            (Some(allowed), Some(sender)) => allowed.contains(sender),
            (Some(_), None) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// SignalRegistry 信号注册表
// ---------------------------------------------------------------------------

/// 信号注册表
///
/// 每个信号对应一个按注册顺序排列、无重复的注册项列表
#[derive(Debug, Default)]
pub struct SignalRegistry {
    map: HashMap<Signal, Vec<HandlerRegistration>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，元数据取自 [`NotificationHandler::meta`]
    ///
    /// 返回是否新增了注册项
    pub fn register<H: NotificationHandler + Default + 'static>(&mut self) -> Result<bool> {
        self.register_meta(HandlerType::of::<H>(), H::meta())
    }

    /// 以给定元数据注册处理器类型
    pub fn register_meta(&mut self, handler: HandlerType, meta: Option<HandlerMeta>) -> Result<bool> {
        let meta = meta.ok_or_else(|| {
            NotifyError::configuration(format!("处理器 {handler:?} 缺少 Meta 定义"))
        })?;

        if meta.is_abstract {
            debug!(handler = ?handler, "抽象处理器，跳过注册");
            return Ok(false);
        }

        let signal = match meta.signal {
            SignalBinding::Unset => {
                return Err(NotifyError::configuration(format!(
                    "处理器 {handler:?} 的 Meta 未声明 signal"
                )));
            }
            SignalBinding::Disabled => {
                debug!(handler = ?handler, "signal 为空，跳过注册");
                return Ok(false);
            }
            SignalBinding::Bound(signal) => signal,
        };

        let registration = HandlerRegistration {
            handler,
            allowed_senders: meta.allowed_senders,
        };

        let entries = self.map.entry(signal.clone()).or_default();
        if entries.contains(&registration) {
            debug!(signal = %signal, handler = ?handler, "重复注册，忽略");
            return Ok(false);
        }

        info!(
            signal = %signal,
            handler = ?handler,
            allowed_senders = ?registration.allowed_senders,
            "处理器已注册"
        );
        entries.push(registration);
        Ok(true)
    }

    /// 信号对应的注册项，未注册时为空
    pub fn get(&self, signal: &Signal) -> &[HandlerRegistration] {
        self.map.get(signal).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 已注册的信号
    pub fn signals(&self) -> impl Iterator<Item = &Signal> {
        self.map.keys()
    }

    /// 注册项总数
    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
