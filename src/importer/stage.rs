// ==========================================
// ERP 导入连接器 - 导入阶段 Trait
// ==========================================
// 职责: 定义各实体导入器的统一接口 (拉取 / 转换 / 对账 / 报告)
// 实现者: PartImporter, RoutingImporter, ProductionImporter
// 红线: 单行失败只记录,不中止阶段
// ==========================================

use crate::domain::{
    ChangeAction, EntityChange, EntityKind, ImportScope, ImportWarning, NaturalKey, RowFailure,
    RowRef, RowSkip, StageKind, StageReport,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::remote::{fetch_collection, CollectionQuery, FieldType, PageStream, RemoteClient, RemoteRow};
use crate::repository::EntityStore;
use crate::resolver::ResolvedCodes;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

// ==========================================
// 行级输入输出
// ==========================================

/// 转换上下文 (只读)
#[derive(Debug, Clone)]
pub struct RowContext {
    pub row_number: usize,
    pub codes: ResolvedCodes, // 本页预热后的代码解析快照
}

/// 转换判定
#[derive(Debug)]
pub enum RowDecision<C> {
    Accept {
        key: NaturalKey,
        candidate: C,
        warnings: Vec<ImportWarning>,
    },
    Skip {
        reason: String,
    },
    Reject(ImportError),
}

/// 对账结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated { changed: Vec<&'static str> },
    Unchanged,
    Duplicate, // 仅追加实体: 完整自然键已存在
}

/// 单行处理结果 (由运行器记入 StageTally)
#[derive(Debug)]
pub enum RowResult {
    Reconciled {
        key: NaturalKey,
        outcome: ReconcileOutcome,
        warnings: Vec<ImportWarning>,
    },
    Skipped {
        key: Option<NaturalKey>,
        reason: String,
    },
    Failed {
        key: Option<NaturalKey>,
        error: ImportError,
    },
}

// ==========================================
// StageTally - 阶段累计器
// ==========================================
// 每次运行新建;并发 worker 通过互斥锁写入
#[derive(Debug)]
pub struct StageTally {
    report: Mutex<StageReport>,
}

impl StageTally {
    pub fn new(stage: StageKind) -> Self {
        Self {
            report: Mutex::new(StageReport::new(stage)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StageReport> {
        // 记账逻辑不会在持锁期间 panic;中毒时沿用已有数据
        self.report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 记录一行处理结果
    pub fn record(&self, row_number: usize, entity: EntityKind, result: RowResult) {
        let mut report = self.lock();
        report.rows_seen += 1;

        match result {
            RowResult::Reconciled {
                key,
                outcome,
                warnings,
            } => {
                let key_text = key.to_string();
                for mut warning in warnings {
                    warning.row = RowRef {
                        row_number,
                        key: Some(key_text.clone()),
                    };
                    report.warnings.push(warning);
                }
                match outcome {
                    ReconcileOutcome::Created => {
                        report.created += 1;
                        report.changes.push(EntityChange {
                            entity,
                            key: key_text,
                            action: ChangeAction::Create,
                            changed_fields: Vec::new(),
                        });
                    }
                    ReconcileOutcome::Updated { changed } => {
                        report.updated += 1;
                        report.changes.push(EntityChange {
                            entity,
                            key: key_text,
                            action: ChangeAction::Update,
                            changed_fields: changed.iter().map(|f| f.to_string()).collect(),
                        });
                    }
                    ReconcileOutcome::Unchanged => report.unchanged += 1,
                    ReconcileOutcome::Duplicate => {
                        report.skipped += 1;
                        report.skips.push(RowSkip {
                            row: RowRef {
                                row_number,
                                key: Some(key_text),
                            },
                            reason: "记录已导入".to_string(),
                        });
                    }
                }
            }
            RowResult::Skipped { key, reason } => {
                report.skipped += 1;
                report.skips.push(RowSkip {
                    row: RowRef {
                        row_number,
                        key: key.map(|k| k.to_string()),
                    },
                    reason,
                });
            }
            RowResult::Failed { key, error } => {
                report.failed += 1;
                report.failures.push(RowFailure {
                    row: RowRef {
                        row_number,
                        key: key.map(|k| k.to_string()),
                    },
                    kind: error.failure_kind(),
                    reason: error.to_string(),
                });
            }
        }
    }

    /// 在运行器收尾时修改报告 (状态、耗时、致命错误)
    pub fn finish(&self, apply: impl FnOnce(&mut StageReport)) {
        apply(&mut self.lock());
    }

    pub fn snapshot(&self) -> StageReport {
        self.lock().clone()
    }
}

// ==========================================
// ImportStage Trait
// ==========================================
#[async_trait]
pub trait ImportStage: Send + Sync {
    /// 转换产出的候选实体
    type Candidate: Send + 'static;

    fn kind(&self) -> StageKind;

    /// 候选实体类型 (报告用)
    fn entity_kind(&self) -> EntityKind;

    /// 本阶段的远程查询 (对象、字段、服务端过滤 + 范围过滤)
    fn query(&self, scope: &ImportScope) -> CollectionQuery;

    /// 转换前需校验的远程字段
    fn required_fields(&self) -> &'static [(&'static str, FieldType)];

    /// 拉取远程行 (默认: 预取分页流)
    fn fetch(
        &self,
        remote: Arc<dyn RemoteClient>,
        query: CollectionQuery,
        prefetch: usize,
        cancel: CancellationToken,
    ) -> PageStream {
        fetch_collection(remote, query, prefetch, cancel)
    }

    /// 需要预热的外部代码
    fn codes_for_warmup(&self, _row: &RemoteRow) -> Vec<String> {
        Vec::new()
    }

    /// 应用业务规则: 接受 / 跳过 / 拒绝
    fn transform(&self, row: &RemoteRow, ctx: &RowContext) -> RowDecision<Self::Candidate>;

    /// 按自然键对账并落库 (预览模式下 store 为覆盖层)
    async fn reconcile(
        &self,
        candidate: Self::Candidate,
        store: &dyn EntityStore,
    ) -> ImportResult<ReconcileOutcome>;

    /// 本阶段累计器
    fn tally(&self) -> &StageTally;

    /// 阶段报告快照
    fn report(&self) -> StageReport {
        self.tally().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureKind, WarningKind};

    #[test]
    fn test_tally_counts_and_details() {
        let tally = StageTally::new(StageKind::Routing);

        tally.record(
            1,
            EntityKind::Operation,
            RowResult::Reconciled {
                key: NaturalKey::operation("D123", 10),
                outcome: ReconcileOutcome::Created,
                warnings: vec![ImportWarning::mapping_unresolved("XY9", "Wc")],
            },
        );
        tally.record(
            2,
            EntityKind::Operation,
            RowResult::Reconciled {
                key: NaturalKey::operation("D123", 20),
                outcome: ReconcileOutcome::Updated {
                    changed: vec!["planned_time"],
                },
                warnings: vec![],
            },
        );
        tally.record(
            3,
            EntityKind::Operation,
            RowResult::Skipped {
                key: None,
                reason: "工序已作废".into(),
            },
        );
        tally.record(
            4,
            EntityKind::Operation,
            RowResult::Failed {
                key: Some(NaturalKey::operation("D999", 10)),
                error: ImportError::dependency("PART", "D999"),
            },
        );

        let report = tally.snapshot();
        assert_eq!(report.rows_seen, 4);
        assert_eq!((report.created, report.updated, report.skipped, report.failed), (1, 1, 1, 1));
        assert_eq!(report.warnings[0].kind, WarningKind::MappingUnresolved);
        assert_eq!(report.warnings[0].row.row_number, 1);
        assert_eq!(report.warnings[0].row.key.as_deref(), Some("D123/10"));
        assert_eq!(report.failures[0].kind, FailureKind::DependencyNotSatisfied);
        assert_eq!(report.changes.len(), 2);
        assert_eq!(report.changes[1].changed_fields, vec!["planned_time"]);
    }

    #[test]
    fn test_duplicate_counts_as_skipped() {
        let tally = StageTally::new(StageKind::Production);
        tally.record(
            1,
            EntityKind::ProductionRecord,
            RowResult::Reconciled {
                key: NaturalKey::part("X"),
                outcome: ReconcileOutcome::Duplicate,
                warnings: vec![],
            },
        );
        let report = tally.snapshot();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert!(!report.has_changes());
    }
}
