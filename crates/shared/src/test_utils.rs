//! 测试工具模块
//!
//! 提供集成测试所需的辅助函数和测试数据生成器，
//! 用于简化测试代码编写，提高测试的可重复性。

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};

use crate::events::{EntityRef, SignalKwargs};

/// 测试用户的实体类型
pub const TEST_USER_KIND: &str = "auth.User";

/// 生成唯一的测试实体 ID
///
/// 使用原子计数器确保并行测试时的唯一性
pub fn test_entity_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::SeqCst).to_string()
}

/// 构造测试用户引用，用户名放在 `username` 属性中
pub fn test_user(username: &str) -> EntityRef {
    EntityRef::new(TEST_USER_KIND, test_entity_id()).with_attribute("username", json!(username))
}

/// 读取测试用户的用户名
pub fn username(user: &EntityRef) -> Option<&str> {
    user.attribute("username").and_then(Value::as_str)
}

/// 构造携带 `recipients` 参数的信号参数
pub fn recipients_kwargs(recipients: &[EntityRef]) -> SignalKwargs {
    let mut kwargs = SignalKwargs::new();
    kwargs.insert(
        "recipients".to_string(),
        serde_json::to_value(recipients).unwrap_or(Value::Null),
    );
    kwargs
}
