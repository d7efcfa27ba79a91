// ==========================================
// ERP 导入连接器 - 代码映射 Repository
// ==========================================
// 表: code_mapping (code, work_center_id, prefix_match, sort_order)
// 加载顺序即注册顺序 (sort_order, rowid),决定前缀等长时的优先级
// ==========================================

use crate::domain::CodeMappingEntry;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub struct CodeMappingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CodeMappingRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按注册顺序加载全部映射
    pub fn load_entries(&self) -> RepositoryResult<Vec<CodeMappingEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT code, work_center_id, prefix_match
            FROM code_mapping
            ORDER BY sort_order, rowid
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CodeMappingEntry {
                code: row.get(0)?,
                work_center_id: row.get(1)?,
                prefix_match: row.get::<_, i64>(2)? != 0,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

        // work_center 表由外部维护;有数据时校验映射目标
        let dangling: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM code_mapping m
            WHERE EXISTS (SELECT 1 FROM work_center)
              AND NOT EXISTS (SELECT 1 FROM work_center w WHERE w.id = m.work_center_id)
            "#,
            [],
            |row| row.get(0),
        )?;
        if dangling > 0 {
            warn!(dangling, "存在指向未知工作中心的代码映射");
        }

        info!(count = entries.len(), "代码映射已加载");
        Ok(entries)
    }

    /// 追加一条映射 (已存在同代码时覆盖)
    pub fn upsert_entry(&self, entry: &CodeMappingEntry, sort_order: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO code_mapping (code, work_center_id, prefix_match, sort_order)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(code) DO UPDATE SET
                work_center_id = excluded.work_center_id,
                prefix_match = excluded.prefix_match,
                sort_order = excluded.sort_order
            "#,
            params![
                entry.code,
                entry.work_center_id,
                entry.prefix_match as i64,
                sort_order
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_in_registration_order() {
        let conn = Arc::new(Mutex::new(crate::db::open_in_memory().unwrap()));
        let repo = CodeMappingRepository::new(conn);

        repo.upsert_entry(&CodeMappingEntry::exact("M01", 80000001), 2)
            .unwrap();
        repo.upsert_entry(&CodeMappingEntry::prefix("KOO", 80000016), 1)
            .unwrap();

        let entries = repo.load_entries().unwrap();
        assert_eq!(
            entries,
            vec![
                CodeMappingEntry::prefix("KOO", 80000016),
                CodeMappingEntry::exact("M01", 80000001),
            ]
        );
    }
}
