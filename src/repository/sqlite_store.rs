// ==========================================
// ERP 导入连接器 - SQLite 实体存储
// ==========================================
// 并发策略:
// - 创建: INSERT ... ON CONFLICT DO NOTHING,竞争失败时在同一锁内回读胜出者
// - 更新: 最后写入者胜出,刷新 updated_at
// - 生产记录: 仅追加,拒绝更新
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::{
    Entity, EntityKind, NaturalKey, Operation, Part, ProductionKey, ProductionRecord,
};
use crate::repository::entity_store::{CreateOutcome, EntityStore};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

// ==========================================
// SqliteEntityStore
// ==========================================
pub struct SqliteEntityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEntityStore {
    /// 打开数据库文件并确保表结构存在
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        init_schema(&conn)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    /// 共享已有连接 (与其他 Repository 共用)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 内存数据库 (测试)
    pub fn open_in_memory() -> RepositoryResult<Self> {
        let conn = crate::db::open_in_memory()
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 统计某类实体的记录数
    pub fn count(&self, kind: EntityKind) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let sql = match kind {
            EntityKind::Part => "SELECT COUNT(*) FROM part",
            EntityKind::Operation => "SELECT COUNT(*) FROM operation",
            EntityKind::ProductionRecord => "SELECT COUNT(*) FROM production_record",
        };
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// 查询物料的全部工序 (按工序号排序)
    pub fn list_operations(&self, article_number: &str) -> RepositoryResult<Vec<Operation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT article_number, seq, work_center_id, work_center_code,
                   planned_time, is_cooperation, manning_pct, description
            FROM operation WHERE article_number = ?1 ORDER BY seq
            "#,
        )?;
        let rows = stmt.query_map(params![article_number], map_operation)?;
        let mut operations = Vec::new();
        for row in rows {
            operations.push(row?);
        }
        Ok(operations)
    }
}

// ==========================================
// 行映射
// ==========================================
fn map_part(row: &rusqlite::Row<'_>) -> rusqlite::Result<Part> {
    Ok(Part {
        article_number: row.get(0)?,
        name: row.get(1)?,
        material: row.get(2)?,
        weight: row.get(3)?,
    })
}

fn map_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Operation> {
    Ok(Operation {
        article_number: row.get(0)?,
        seq: row.get(1)?,
        work_center_id: row.get(2)?,
        work_center_code: row.get(3)?,
        planned_time: row.get(4)?,
        is_cooperation: row.get::<_, i64>(5)? != 0,
        manning_pct: row.get(6)?,
        description: row.get(7)?,
    })
}

fn map_production(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProductionRecord> {
    Ok(ProductionRecord {
        key: ProductionKey {
            job: row.get(0)?,
            batch: row.get(1)?,
            article_number: row.get(2)?,
            operation_seq: row.get(3)?,
            date: row.get::<_, NaiveDate>(4)?,
        },
        actual_time: row.get(5)?,
        machine_code: row.get(6)?,
        work_center_id: row.get(7)?,
    })
}

// ==========================================
// 同步 SQL (调用方持有连接锁)
// ==========================================
fn find_in(conn: &Connection, key: &NaturalKey) -> RepositoryResult<Option<Entity>> {
    let entity = match key {
        NaturalKey::Part { article_number } => conn
            .query_row(
                "SELECT article_number, name, material, weight FROM part WHERE article_number = ?1",
                params![article_number],
                map_part,
            )
            .optional()?
            .map(Entity::Part),
        NaturalKey::Operation {
            article_number,
            seq,
        } => conn
            .query_row(
                r#"
                SELECT article_number, seq, work_center_id, work_center_code,
                       planned_time, is_cooperation, manning_pct, description
                FROM operation WHERE article_number = ?1 AND seq = ?2
                "#,
                params![article_number, seq],
                map_operation,
            )
            .optional()?
            .map(Entity::Operation),
        NaturalKey::Production(k) => conn
            .query_row(
                r#"
                SELECT job, batch, article_number, operation_seq, record_date,
                       actual_time, machine_code, work_center_id
                FROM production_record
                WHERE job = ?1 AND batch = ?2 AND article_number = ?3
                  AND operation_seq = ?4 AND record_date = ?5
                "#,
                params![k.job, k.batch, k.article_number, k.operation_seq, k.date],
                map_production,
            )
            .optional()?
            .map(Entity::ProductionRecord),
    };
    Ok(entity)
}

/// 插入;返回受影响行数 (0 表示自然键冲突)
fn insert_in(conn: &Connection, entity: &Entity) -> RepositoryResult<usize> {
    let now = Utc::now().to_rfc3339();
    let affected = match entity {
        Entity::Part(p) => conn.execute(
            r#"
            INSERT INTO part (article_number, name, material, weight, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(article_number) DO NOTHING
            "#,
            params![p.article_number, p.name, p.material, p.weight, now],
        )?,
        Entity::Operation(o) => conn.execute(
            r#"
            INSERT INTO operation (
                article_number, seq, work_center_id, work_center_code, planned_time,
                is_cooperation, manning_pct, description, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(article_number, seq) DO NOTHING
            "#,
            params![
                o.article_number,
                o.seq,
                o.work_center_id,
                o.work_center_code,
                o.planned_time,
                o.is_cooperation as i64,
                o.manning_pct,
                o.description,
                now
            ],
        )?,
        Entity::ProductionRecord(r) => conn.execute(
            r#"
            INSERT INTO production_record (
                job, batch, article_number, operation_seq, record_date,
                actual_time, machine_code, work_center_id, imported_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(job, batch, article_number, operation_seq, record_date) DO NOTHING
            "#,
            params![
                r.key.job,
                r.key.batch,
                r.key.article_number,
                r.key.operation_seq,
                r.key.date,
                r.actual_time,
                r.machine_code,
                r.work_center_id,
                now
            ],
        )?,
    };
    Ok(affected)
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> RepositoryResult<Option<Entity>> {
        let conn = self.get_conn()?;
        find_in(&conn, key)
    }

    async fn create(&self, entity: &Entity) -> RepositoryResult<CreateOutcome> {
        let conn = self.get_conn()?;
        let key = entity.natural_key();

        if insert_in(&conn, entity)? > 0 {
            debug!(kind = %key.kind(), key = %key, "实体已创建");
            return Ok(CreateOutcome::Created);
        }

        // 自然键冲突: 回读胜出者
        match find_in(&conn, &key)? {
            Some(existing) => {
                debug!(kind = %key.kind(), key = %key, "实体已存在,跳过创建");
                Ok(CreateOutcome::AlreadyExists(existing))
            }
            None => Err(RepositoryError::DatabaseQueryError(format!(
                "插入冲突但未找到已有记录: {}",
                key
            ))),
        }
    }

    async fn update(
        &self,
        entity: &Entity,
        changed_fields: &[&'static str],
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();
        let key = entity.natural_key();

        let affected = match entity {
            Entity::Part(p) => conn.execute(
                r#"
                UPDATE part SET name = ?2, material = ?3, weight = ?4, updated_at = ?5
                WHERE article_number = ?1
                "#,
                params![p.article_number, p.name, p.material, p.weight, now],
            )?,
            Entity::Operation(o) => conn.execute(
                r#"
                UPDATE operation SET
                    work_center_id = ?3, work_center_code = ?4, planned_time = ?5,
                    is_cooperation = ?6, manning_pct = ?7, description = ?8, updated_at = ?9
                WHERE article_number = ?1 AND seq = ?2
                "#,
                params![
                    o.article_number,
                    o.seq,
                    o.work_center_id,
                    o.work_center_code,
                    o.planned_time,
                    o.is_cooperation as i64,
                    o.manning_pct,
                    o.description,
                    now
                ],
            )?,
            Entity::ProductionRecord(_) => {
                warn!(key = %key, "拒绝更新生产记录");
                return Err(RepositoryError::BusinessRuleViolation(format!(
                    "生产记录仅追加,不可更新: {}",
                    key
                )));
            }
        };

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: key.kind().to_string(),
                key: key.to_string(),
            });
        }

        debug!(kind = %key.kind(), key = %key, fields = ?changed_fields, "实体已更新");
        Ok(())
    }

    async fn exists_by_full_key(&self, key: &NaturalKey) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let exists = match key {
            NaturalKey::Production(k) => conn
                .query_row(
                    r#"
                    SELECT 1 FROM production_record
                    WHERE job = ?1 AND batch = ?2 AND article_number = ?3
                      AND operation_seq = ?4 AND record_date = ?5
                    LIMIT 1
                    "#,
                    params![k.job, k.batch, k.article_number, k.operation_seq, k.date],
                    |_row| Ok(true),
                )
                .optional()?
                .unwrap_or(false),
            _ => find_in(&conn, key)?.is_some(),
        };
        Ok(exists)
    }
}
