//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。
//! 通知组件的所有可识别配置项集中在 [`NotifySettings`]，宿主应用通过
//! `NOTIFYKIT_` 前缀的环境变量覆盖默认值。

use std::collections::BTreeSet;
use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, Result};
use crate::observability::ObservabilityConfig;

/// 宿主覆盖配置时使用的名称前缀
pub const SETTINGS_PREFIX: &str = "NOTIFYKIT";

/// 默认通知模型名称
pub const DEFAULT_NOTIFICATION_MODEL: &str = "notifykit.Notification";

/// 默认接收器名称
pub const DEFAULT_RECEIVER: &str = "SynchronousReceiver";

/// 通知组件配置
///
/// 字段名即配置键（小写形式）。未在配置源中出现的键使用默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// 启动时需要加载的处理器模块，加载后其中的处理器完成注册
    pub autoload_modules: Vec<String>,
    /// 全局开关，关闭后所有处理器的基础门控均返回 false
    pub enabled: bool,
    /// 创建通知时使用的通知模型名称
    pub notification_model: String,
    /// 信号接收器名称
    pub receiver: String,
    /// 渲染时允许访问的关联对象属性
    pub related_objects_allowed_attributes: BTreeSet<String>,
    pub strip_html: bool,
    pub template_check: bool,
    pub template_prefix: String,
    pub template_translate: bool,
    /// 后台任务队列容量
    pub queue_capacity: usize,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            autoload_modules: Vec::new(),
            enabled: true,
            notification_model: DEFAULT_NOTIFICATION_MODEL.to_string(),
            receiver: DEFAULT_RECEIVER.to_string(),
            related_objects_allowed_attributes: BTreeSet::from(["get_absolute_url".to_string()]),
            strip_html: false,
            template_check: false,
            template_prefix: String::new(),
            template_translate: false,
            queue_capacity: 1024,
        }
    }
}

impl NotifySettings {
    /// 在默认值之上叠加 `NOTIFYKIT_<KEY>` 环境变量
    pub fn load() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// 以当前值为基础叠加环境变量覆盖
    ///
    /// 列表类配置项以逗号分隔，如 `NOTIFYKIT_AUTOLOAD_MODULES=articles,comments`
    pub fn with_env_overrides(self) -> Result<Self> {
        let base = Config::try_from(&self)?;

        let merged = Config::builder()
            .add_source(base)
            .add_source(
                Environment::with_prefix(SETTINGS_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("autoload_modules")
                    .with_list_parse_key("related_objects_allowed_attributes"),
            )
            .build()?;

        Ok(merged.try_deserialize()?)
    }

    /// 按配置项名称（大写，如 `STRIP_HTML`）解析配置值
    ///
    /// 未知的配置项返回 [`NotifyError::InvalidSetting`]
    pub fn get(&self, key: &str) -> Result<serde_json::Value> {
        if key.is_empty() || key != key.to_ascii_uppercase() {
            return Err(NotifyError::InvalidSetting(key.to_string()));
        }

        let values = serde_json::to_value(self)?;
        values
            .get(key.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| NotifyError::InvalidSetting(key.to_string()))
    }

    /// 所有可识别的配置项名称
    pub fn keys() -> Vec<String> {
        match serde_json::to_value(Self::default()) {
            Ok(serde_json::Value::Object(map)) => {
                map.keys().map(|k| k.to_ascii_uppercase()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub notify: NotifySettings,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 嵌套环境变量（如 NOTIFYKIT__OBSERVABILITY__LOG_LEVEL）
    /// 5. 通知配置项环境变量（如 NOTIFYKIT_STRIP_HTML）
    pub fn load(service_name: &str) -> Result<Self> {
        let env = std::env::var("NOTIFYKIT_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(SETTINGS_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;
        config.notify = config.notify.with_env_overrides()?;
        if config.observability.service_name.is_empty() {
            config.observability.service_name = config.service_name.clone();
        }

        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
