// ==========================================
// ERP 导入连接器 - 实体存储 Trait
// ==========================================
// 职责: 导入器与本地数据模型之间的持久化协作接口
// 红线: Repository 不含业务规则,只做按自然键的查/增/改
// 实现者: SqliteEntityStore (执行), OverlayStore (预览)
// ==========================================

use crate::domain::{Entity, NaturalKey};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

/// 创建结果
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created,
    /// 并发写入方先创建成功,返回已存在的实体
    AlreadyExists(Entity),
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// 按自然键查询实体
    async fn find_by_natural_key(&self, key: &NaturalKey) -> RepositoryResult<Option<Entity>>;

    /// 创建实体
    ///
    /// # 返回
    /// - Created: 本次写入成功
    /// - AlreadyExists: 同一自然键已存在 (含并发竞争失败),不会产生重复记录
    async fn create(&self, entity: &Entity) -> RepositoryResult<CreateOutcome>;

    /// 更新实体的导入字段
    ///
    /// # 参数
    /// - entity: 新值
    /// - changed_fields: 发生变化的字段 (仅用于日志)
    async fn update(&self, entity: &Entity, changed_fields: &[&'static str])
        -> RepositoryResult<()>;

    /// 判断完整自然键是否已存在
    async fn exists_by_full_key(&self, key: &NaturalKey) -> RepositoryResult<bool>;
}
