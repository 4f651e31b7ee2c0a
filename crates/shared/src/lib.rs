//! 共享库
//!
//! 包含通知组件各 crate 共用的配置、错误处理、信号事件模型与可观测性初始化代码。

pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod test_utils;
