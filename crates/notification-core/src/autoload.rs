//! 处理器模块自动加载
//!
//! 宿主应用把每个处理器模块的注册函数登记到 [`HandlerCatalog`]，
//! 启动时按 `AUTOLOAD_MODULES` 列出的模块名依次执行注册。

use std::collections::BTreeMap;

use notifykit_shared::error::{NotifyError, Result};
use tracing::info;

use crate::registry::SignalRegistry;

/// 模块注册函数
pub type RegisterFn = fn(&mut SignalRegistry) -> Result<()>;

/// 处理器模块目录
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    modules: BTreeMap<String, RegisterFn>,
}

impl HandlerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记模块
    pub fn module(mut self, name: impl Into<String>, register: RegisterFn) -> Self {
        self.modules.insert(name.into(), register);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// 按顺序加载模块，未登记的模块名视为配置错误
    pub fn load(&self, modules: &[String], registry: &mut SignalRegistry) -> Result<()> {
        for name in modules {
            let register = self.modules.get(name).ok_or_else(|| {
                NotifyError::configuration(format!("AUTOLOAD_MODULES 包含未登记的模块: {name}"))
            })?;
            register(registry)?;
            info!(module = %name, "处理器模块已加载");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerContext, NotificationHandler};
    use crate::registry::HandlerMeta;
    use async_trait::async_trait;
    use notifykit_shared::events::{EntityRef, Signal};

    const PUBLISHED: Signal = Signal::from_static("article_published");

    #[derive(Default)]
    struct PublishedHandler;

    #[async_trait]
    impl NotificationHandler for PublishedHandler {
        fn meta() -> Option<HandlerMeta> {
            Some(HandlerMeta::for_signal(PUBLISHED))
        }

        async fn recipients(&self, _ctx: &HandlerContext) -> Result<Vec<EntityRef>> {
            Ok(Vec::new())
        }
    }

    fn register_articles(registry: &mut SignalRegistry) -> Result<()> {
        registry.register::<PublishedHandler>()?;
        Ok(())
    }

    #[test]
    fn test_load_listed_modules() {
        let catalog = HandlerCatalog::new().module("articles.handlers", register_articles);
        let mut registry = SignalRegistry::new();

        catalog
            .load(&["articles.handlers".to_string()], &mut registry)
            .unwrap();
        assert_eq!(registry.get(&PUBLISHED).len(), 1);

        // 重复加载不产生重复注册
        catalog
            .load(&["articles.handlers".to_string()], &mut registry)
            .unwrap();
        assert_eq!(registry.get(&PUBLISHED).len(), 1);
    }

    #[test]
    fn test_unknown_module_is_configuration_error() {
        let catalog = HandlerCatalog::new();
        let mut registry = SignalRegistry::new();
        let err = catalog
            .load(&["missing.handlers".to_string()], &mut registry)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
