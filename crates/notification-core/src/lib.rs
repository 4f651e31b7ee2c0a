//! 信号驱动的通知核心
//!
//! 应用代码发出信号，已注册的处理器把信号转换为持久化的通知记录，
//! 并通过可插拔的分发器（即时投递、后台任务队列等）送达接收者。

pub mod autoload;
pub mod center;
pub mod dispatcher;
pub mod handler;
pub mod models;
pub mod notification_model;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod store;
pub mod template;

pub use center::NotificationCenter;
pub use dispatcher::{Dispatcher, DispatcherRegistry};
pub use handler::{HandlerContext, HandlerRunner, NotificationHandler};
pub use models::{Notification, NotificationTemplate, TemplateData};
pub use registry::{HandlerMeta, SignalRegistry};
