// ==========================================
// ERP 导入连接器 - 导入报告
// ==========================================
// 用途: 阶段报告 + 运行汇总报告 (Web 层渲染契约)
// 生命周期: 每次运行新建,返回后不可变
// ==========================================

use crate::domain::entity::EntityKind;
use crate::domain::types::{RunMode, RunStatus, StageKind, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// 行级明细
// ==========================================

/// 行定位信息 (流内序号 + 可识别的自然键)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub row_number: usize,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    MappingUnresolved, // 代码未解析,实体以空引用落库
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportWarning {
    pub row: RowRef,
    pub kind: WarningKind,
    pub code: Option<String>,
    pub message: String,
}

impl ImportWarning {
    pub fn mapping_unresolved(code: &str, field: &str) -> Self {
        Self {
            row: RowRef {
                row_number: 0,
                key: None,
            },
            kind: WarningKind::MappingUnresolved,
            code: Some(code.to_string()),
            message: format!("{} 代码未找到映射: {}", field, code),
        }
    }

    /// 代码字段为空,同样按空引用处理
    pub fn code_missing(field: &str) -> Self {
        Self {
            row: RowRef {
                row_number: 0,
                key: None,
            },
            kind: WarningKind::MappingUnresolved,
            code: None,
            message: format!("{} 代码缺失", field),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    DependencyNotSatisfied,
    Validation,
    Timeout,
    Persistence,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row: RowRef,
    pub kind: FailureKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSkip {
    pub row: RowRef,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    Create,
    Update,
}

/// 差异摘要 (预览模式供人工审核)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChange {
    pub entity: EntityKind,
    pub key: String,
    pub action: ChangeAction,
    pub changed_fields: Vec<String>,
}

// ==========================================
// StageReport - 阶段报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub status: StageStatus,

    // ===== 计数 =====
    pub rows_seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,

    // ===== 明细 =====
    pub warnings: Vec<ImportWarning>,
    pub failures: Vec<RowFailure>,
    pub skips: Vec<RowSkip>,
    pub changes: Vec<EntityChange>,

    pub fatal_error: Option<String>,
    pub elapsed_ms: u64,
}

impl StageReport {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            rows_seen: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            warnings: Vec::new(),
            failures: Vec::new(),
            skips: Vec::new(),
            changes: Vec::new(),
            fatal_error: None,
            elapsed_ms: 0,
        }
    }

    pub fn not_started(stage: StageKind) -> Self {
        Self {
            status: StageStatus::NotStarted,
            ..Self::new(stage)
        }
    }

    /// 是否发生了实体变更 (新增或更新)
    pub fn has_changes(&self) -> bool {
        self.created > 0 || self.updated > 0
    }
}

// ==========================================
// ReportTotals - 跨阶段汇总
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub rows_seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub warnings: usize,
}

// ==========================================
// CompositeReport - 运行汇总报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeReport {
    pub run_id: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
    pub fatal_error: Option<String>,
}

impl CompositeReport {
    pub fn stage(&self, kind: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == kind)
    }

    pub fn totals(&self) -> ReportTotals {
        self.stages
            .iter()
            .fold(ReportTotals::default(), |mut acc, stage| {
                acc.rows_seen += stage.rows_seen;
                acc.created += stage.created;
                acc.updated += stage.updated;
                acc.unchanged += stage.unchanged;
                acc.skipped += stage.skipped;
                acc.failed += stage.failed;
                acc.warnings += stage.warnings.len();
                acc
            })
    }

    /// 由阶段结果推导运行状态
    ///
    /// 优先级: 取消 > 中止 > 部分失败 > 成功
    pub fn derive_status(stages: &[StageReport], fatal_error: Option<&str>) -> RunStatus {
        if stages.iter().any(|s| s.status == StageStatus::Cancelled) {
            return RunStatus::Cancelled;
        }
        if fatal_error.is_some() || stages.iter().any(|s| s.status == StageStatus::Aborted) {
            return RunStatus::Aborted;
        }
        if stages.iter().any(|s| s.failed > 0) {
            return RunStatus::PartiallyFailed;
        }
        RunStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(kind: StageKind, status: StageStatus, created: usize, failed: usize) -> StageReport {
        StageReport {
            status,
            created,
            failed,
            ..StageReport::new(kind)
        }
    }

    #[test]
    fn test_derive_status_precedence() {
        let ok = stage(StageKind::MasterData, StageStatus::Completed, 1, 0);
        let failed = stage(StageKind::Routing, StageStatus::CompletedWithFailures, 0, 2);
        let aborted = stage(StageKind::Production, StageStatus::Aborted, 0, 0);
        let cancelled = stage(StageKind::Production, StageStatus::Cancelled, 0, 0);

        assert_eq!(
            CompositeReport::derive_status(&[ok.clone()], None),
            RunStatus::Succeeded
        );
        assert_eq!(
            CompositeReport::derive_status(&[ok.clone(), failed.clone()], None),
            RunStatus::PartiallyFailed
        );
        assert_eq!(
            CompositeReport::derive_status(&[ok.clone(), failed.clone(), aborted], None),
            RunStatus::Aborted
        );
        assert_eq!(
            CompositeReport::derive_status(&[ok.clone(), cancelled], None),
            RunStatus::Cancelled
        );
        assert_eq!(
            CompositeReport::derive_status(&[ok], Some("auth")),
            RunStatus::Aborted
        );
    }

    #[test]
    fn test_totals_sum_all_stages() {
        let mut a = stage(StageKind::MasterData, StageStatus::Completed, 2, 0);
        a.unchanged = 3;
        let mut b = stage(StageKind::Routing, StageStatus::CompletedWithFailures, 1, 1);
        b.warnings
            .push(ImportWarning::mapping_unresolved("XY9", "Wc"));

        let report = CompositeReport {
            run_id: "r".to_string(),
            mode: RunMode::Preview,
            status: RunStatus::PartiallyFailed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            stages: vec![a, b],
            fatal_error: None,
        };

        let totals = report.totals();
        assert_eq!(totals.created, 3);
        assert_eq!(totals.unchanged, 3);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.warnings, 1);
        assert!(report.stage(StageKind::Production).is_none());
    }
}
