// ==========================================
// ERP 导入连接器 - 预览覆盖存储
// ==========================================
// 读: 先查暂存区,再查底层存储
// 写: 只进入暂存区,底层存储从不修改
// 用途: 预览模式与执行模式走同一对账路径,且后续阶段可见前序阶段的拟创建实体
// ==========================================

use crate::domain::{Entity, NaturalKey};
use crate::repository::entity_store::{CreateOutcome, EntityStore};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct OverlayStore {
    base: Arc<dyn EntityStore>,
    staged: Mutex<HashMap<NaturalKey, Entity>>,
}

impl OverlayStore {
    pub fn new(base: Arc<dyn EntityStore>) -> Self {
        Self {
            base,
            staged: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl EntityStore for OverlayStore {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> RepositoryResult<Option<Entity>> {
        if let Some(entity) = self.staged.lock().await.get(key) {
            return Ok(Some(entity.clone()));
        }
        self.base.find_by_natural_key(key).await
    }

    async fn create(&self, entity: &Entity) -> RepositoryResult<CreateOutcome> {
        let key = entity.natural_key();
        // 持锁完成查重与暂存,同键并发创建只有一个成功
        let mut staged = self.staged.lock().await;
        if let Some(existing) = staged.get(&key) {
            return Ok(CreateOutcome::AlreadyExists(existing.clone()));
        }
        if let Some(existing) = self.base.find_by_natural_key(&key).await? {
            return Ok(CreateOutcome::AlreadyExists(existing));
        }
        staged.insert(key, entity.clone());
        Ok(CreateOutcome::Created)
    }

    async fn update(
        &self,
        entity: &Entity,
        _changed_fields: &[&'static str],
    ) -> RepositoryResult<()> {
        if let Entity::ProductionRecord(_) = entity {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "生产记录仅追加,不可更新: {}",
                entity.natural_key()
            )));
        }
        let key = entity.natural_key();
        let mut staged = self.staged.lock().await;
        if !staged.contains_key(&key) && self.base.find_by_natural_key(&key).await?.is_none() {
            return Err(RepositoryError::NotFound {
                entity: key.kind().to_string(),
                key: key.to_string(),
            });
        }
        staged.insert(key, entity.clone());
        Ok(())
    }

    async fn exists_by_full_key(&self, key: &NaturalKey) -> RepositoryResult<bool> {
        if self.staged.lock().await.contains_key(key) {
            return Ok(true);
        }
        self.base.exists_by_full_key(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntityKind, Part};
    use crate::repository::sqlite_store::SqliteEntityStore;

    fn part(article: &str, name: &str) -> Entity {
        Entity::Part(Part {
            article_number: article.to_string(),
            name: name.to_string(),
            material: None,
            weight: None,
        })
    }

    #[tokio::test]
    async fn test_overlay_never_writes_base() {
        let base = Arc::new(SqliteEntityStore::open_in_memory().unwrap());
        base.create(&part("D100", "Existing")).await.unwrap();

        let overlay = OverlayStore::new(base.clone());
        assert_eq!(
            overlay.create(&part("D200", "New")).await.unwrap(),
            CreateOutcome::Created
        );
        overlay
            .update(&part("D100", "Renamed"), &["name"])
            .await
            .unwrap();

        // 覆盖层可见
        assert_eq!(
            overlay
                .find_by_natural_key(&NaturalKey::part("D100"))
                .await
                .unwrap(),
            Some(part("D100", "Renamed"))
        );
        assert!(overlay
            .exists_by_full_key(&NaturalKey::part("D200"))
            .await
            .unwrap());

        // 底层不变
        assert_eq!(base.count(EntityKind::Part).unwrap(), 1);
        assert_eq!(
            base.find_by_natural_key(&NaturalKey::part("D100"))
                .await
                .unwrap(),
            Some(part("D100", "Existing"))
        );
    }

    #[tokio::test]
    async fn test_overlay_create_existing_in_base() {
        let base = Arc::new(SqliteEntityStore::open_in_memory().unwrap());
        base.create(&part("D100", "Existing")).await.unwrap();

        let overlay = OverlayStore::new(base);
        assert_eq!(
            overlay.create(&part("D100", "Other")).await.unwrap(),
            CreateOutcome::AlreadyExists(part("D100", "Existing"))
        );
    }
}
