// ==========================================
// ERP 导入连接器 - 通用对账逻辑
// ==========================================
// upsert: 查 → 不存在则建 → 竞争失败回读胜出者 → 比较 → 有变化才更新
// insert_if_absent: 仅追加实体的去重插入
// ==========================================

use crate::domain::{Entity, NaturalKey};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::stage::ReconcileOutcome;
use crate::repository::{CreateOutcome, EntityStore, RepositoryError};
use tracing::debug;

/// 依赖实体必须已存在
pub async fn require_exists(store: &dyn EntityStore, key: &NaturalKey) -> ImportResult<()> {
    if store.exists_by_full_key(key).await? {
        Ok(())
    } else {
        Err(ImportError::dependency(key.kind().to_string(), key.to_string()))
    }
}

/// 外键冲突视为依赖未满足
fn map_create_error(err: RepositoryError, key: &NaturalKey) -> ImportError {
    match err {
        RepositoryError::ForeignKeyViolation(_) => {
            ImportError::dependency(key.kind().to_string(), format!("{} 的引用", key))
        }
        other => ImportError::Repository(other),
    }
}

/// 创建或更新 (最后写入者胜出)
pub async fn upsert(store: &dyn EntityStore, entity: Entity) -> ImportResult<ReconcileOutcome> {
    let key = entity.natural_key();

    let existing = match store.find_by_natural_key(&key).await? {
        Some(existing) => existing,
        None => match store
            .create(&entity)
            .await
            .map_err(|e| map_create_error(e, &key))?
        {
            CreateOutcome::Created => return Ok(ReconcileOutcome::Created),
            CreateOutcome::AlreadyExists(winner) => {
                debug!(key = %key, "并发创建竞争失败,转为比较更新");
                winner
            }
        },
    };

    let changed = entity.diff(&existing);
    if changed.is_empty() {
        return Ok(ReconcileOutcome::Unchanged);
    }
    store.update(&entity, &changed).await?;
    Ok(ReconcileOutcome::Updated { changed })
}

/// 不存在则插入,已存在视为重复
pub async fn insert_if_absent(
    store: &dyn EntityStore,
    entity: Entity,
) -> ImportResult<ReconcileOutcome> {
    let key = entity.natural_key();
    if store.exists_by_full_key(&key).await? {
        return Ok(ReconcileOutcome::Duplicate);
    }
    match store
        .create(&entity)
        .await
        .map_err(|e| map_create_error(e, &key))?
    {
        CreateOutcome::Created => Ok(ReconcileOutcome::Created),
        CreateOutcome::AlreadyExists(_) => Ok(ReconcileOutcome::Duplicate),
    }
}
