//! 模板解析
//!
//! 每次处理器调用解析一次模板（而非每个接收者一次）：
//! - 内联数据：在存储中查找等价模板复用，找不到则新建
//! - slug：查找管理模板；未激活时中止本次处理，激活时返回其内容载体，
//!   载体不存在则复制管理模板字段惰性创建

use notifykit_shared::error::{NotifyError, Result};
use tracing::debug;

use crate::handler::{HandlerContext, NotificationHandler};
use crate::models::{NotificationTemplate, TemplateData};
use crate::store::StoreTransaction;

/// 处理器声明的模板来源
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    Inline(TemplateData),
    Slug(String),
}

impl TemplateSource {
    /// 读取处理器声明的模板来源，两者都声明或都未声明时视为配置错误
    pub fn from_handler(handler: &dyn NotificationHandler, ctx: &HandlerContext) -> Result<Self> {
        match (handler.template_slug(), handler.template_data(ctx)?) {
            (Some(slug), None) => Ok(Self::Slug(slug.to_string())),
            (None, Some(data)) => Ok(Self::Inline(data)),
            (Some(_), Some(_)) => Err(NotifyError::configuration(format!(
                "处理器 {} 同时声明了 template_slug 与 template_data",
                handler.name()
            ))),
            (None, None) => Err(NotifyError::configuration(format!(
                "处理器 {} 必须声明 template_slug 或 template_data 之一",
                handler.name()
            ))),
        }
    }
}

/// 模板解析器
pub struct TemplateResolver;

impl TemplateResolver {
    /// 解析模板，返回 `None` 表示管理模板未激活、应中止本次处理
    pub async fn resolve(
        tx: &mut dyn StoreTransaction,
        source: &TemplateSource,
    ) -> Result<Option<NotificationTemplate>> {
        match source {
            TemplateSource::Slug(slug) => Self::resolve_slug(tx, slug).await,
            TemplateSource::Inline(data) => Self::resolve_inline(tx, data).await.map(Some),
        }
    }

    async fn resolve_slug(
        tx: &mut dyn StoreTransaction,
        slug: &str,
    ) -> Result<Option<NotificationTemplate>> {
        let admin = tx.admin_template(slug).await?.ok_or_else(|| {
            NotifyError::configuration(format!("模板 slug={slug} 没有对应的管理模板"))
        })?;

        if !admin.is_active {
            debug!(slug = %slug, "管理模板未激活");
            return Ok(None);
        }

        if let Some(template_id) = admin.template_id
            && let Some(template) = tx.template(template_id).await?
        {
            return Ok(Some(template));
        }

        let template = NotificationTemplate::from_admin(&admin);
        tx.insert_template(template.clone()).await?;
        tx.link_admin_template(slug, template.id).await?;
        debug!(slug = %slug, template_id = %template.id, "已为管理模板创建内容载体");
        Ok(Some(template))
    }

    async fn resolve_inline(
        tx: &mut dyn StoreTransaction,
        data: &TemplateData,
    ) -> Result<NotificationTemplate> {
        if let Some(existing) = tx.find_template(data).await? {
            return Ok(existing);
        }

        let template = NotificationTemplate::from_data(data.clone());
        tx.insert_template(template.clone()).await?;
        debug!(template_id = %template.id, "已创建内联模板");
        Ok(template)
    }
}
