//! 通知工作者
//!
//! 消费后台任务队列：执行排队的信号，渲染排队的通知并通过多渠道发送器并行推送。
//! 各渠道独立发送，单个渠道失败不影响其他渠道的投递。

pub mod consumer;
pub mod error;
pub mod sender;
pub mod templates;
