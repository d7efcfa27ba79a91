// ==========================================
// ERP 导入连接器 - 导入运行记录 Repository
// ==========================================
// 表: import_run (执行模式每次运行一行,报告整体 JSON 存档)
// 预览运行不落库
// ==========================================

use crate::domain::{CompositeReport, ReportTotals, RunStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// 运行摘要 (历史列表)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRunSummary {
    pub run_id: String,
    pub mode: String,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: String,
    pub totals: ReportTotals,
}

pub struct ImportRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportRunRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 保存运行报告
    pub fn insert_run(&self, report: &CompositeReport) -> RepositoryResult<()> {
        let report_json = serde_json::to_string(report)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_run (run_id, mode, status, started_at, finished_at, report_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                report.run_id,
                report.mode.to_string(),
                report.status.to_string(),
                report.started_at.to_rfc3339(),
                report.finished_at.to_rfc3339(),
                report_json
            ],
        )?;
        Ok(())
    }

    /// 按运行 ID 读取完整报告
    pub fn get_run(&self, run_id: &str) -> RepositoryResult<Option<CompositeReport>> {
        let conn = self.get_conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT report_json FROM import_run WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// 最近的运行 (按开始时间倒序)
    pub fn recent_runs(&self, limit: usize) -> RepositoryResult<Vec<ImportRunSummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT run_id, mode, status, started_at, finished_at, report_json
            FROM import_run
            ORDER BY started_at DESC, run_id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (run_id, mode, status, started_at, finished_at, report_json) = row?;
            let status = status
                .parse::<RunStatus>()
                .map_err(|message| RepositoryError::FieldValueError {
                    field: "status".to_string(),
                    message,
                })?;
            let report: CompositeReport = serde_json::from_str(&report_json)?;
            summaries.push(ImportRunSummary {
                run_id,
                mode,
                status,
                started_at,
                finished_at,
                totals: report.totals(),
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunMode, StageKind, StageReport};
    use chrono::{Duration, Utc};

    fn report(run_id: &str, offset_secs: i64) -> CompositeReport {
        let started = Utc::now() + Duration::seconds(offset_secs);
        let mut stage = StageReport::new(StageKind::MasterData);
        stage.created = 2;
        CompositeReport {
            run_id: run_id.to_string(),
            mode: RunMode::Execute,
            status: RunStatus::Succeeded,
            started_at: started,
            finished_at: started,
            stages: vec![stage],
            fatal_error: None,
        }
    }

    #[test]
    fn test_insert_and_list_recent() {
        let conn = Arc::new(Mutex::new(crate::db::open_in_memory().unwrap()));
        let repo = ImportRunRepository::new(conn);

        repo.insert_run(&report("run-a", 0)).unwrap();
        repo.insert_run(&report("run-b", 10)).unwrap();

        let recent = repo.recent_runs(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].run_id, "run-b");
        assert_eq!(recent[0].mode, "EXECUTE");
        assert_eq!(recent[0].totals.created, 2);

        let loaded = repo.get_run("run-a").unwrap().unwrap();
        assert_eq!(loaded.run_id, "run-a");
        assert!(repo.get_run("missing").unwrap().is_none());
    }
}
