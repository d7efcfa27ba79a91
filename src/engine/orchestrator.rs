// ==========================================
// ERP 导入连接器 - 导入编排器
// ==========================================
// 用途: 按依赖顺序调度导入阶段,汇总运行报告
// 顺序: 物料主数据 → 工艺路线 → 生产执行记录
// 模式:
// - Preview: 叠加层存储,走完整对账路径但不落库
// - Execute: 直接写入本地存储,并记录运行历史
// 红线: 阶段中止/取消后,后续阶段一律 NotStarted
// ==========================================

use crate::config::ConnectorSettings;
use crate::domain::{
    CodeMappingEntry, CompositeReport, ImportScope, RunMode, RunStatus, StageKind, StageReport,
    StageStatus,
};
use crate::importer::{
    run_stage, ErrorScope, PartImporter, ProductionImporter, RoutingImporter, RoutingRules,
    StageOutcome, StageRunContext,
};
use crate::remote::{RemoteClient, Retrying};
use crate::repository::{EntityStore, ImportRunRepository, OverlayStore};
use crate::resolver::CodeResolver;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// ImportOrchestrator - 导入编排器
// ==========================================

pub struct ImportOrchestrator {
    remote: Arc<dyn RemoteClient>,
    store: Arc<dyn EntityStore>,
    mappings: Arc<Vec<CodeMappingEntry>>,
    settings: ConnectorSettings,
    run_history: Option<ImportRunRepository>,
}

impl ImportOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - remote: 远程客户端 (内部包装重试与超时)
    /// - store: 本地实体存储
    /// - mappings: 代码映射配置 (已按 sort_order 排序)
    /// - settings: 运行开始时的配置快照
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        store: Arc<dyn EntityStore>,
        mappings: Vec<CodeMappingEntry>,
        settings: ConnectorSettings,
    ) -> Self {
        let remote: Arc<dyn RemoteClient> =
            Arc::new(Retrying::new(remote, settings.retry.clone()));
        Self {
            remote,
            store,
            mappings: Arc::new(mappings),
            settings,
            run_history: None,
        }
    }

    /// 配置在任何阶段开始前即被拒绝: 运行中止,所有阶段 NotStarted
    pub fn rejected_report(mode: RunMode, scope: &ImportScope, reason: &str) -> CompositeReport {
        let now = Utc::now();
        CompositeReport {
            run_id: Uuid::new_v4().to_string(),
            mode,
            status: RunStatus::Aborted,
            started_at: now,
            finished_at: now,
            stages: scope
                .stages
                .iter()
                .copied()
                .map(StageReport::not_started)
                .collect(),
            fatal_error: Some(reason.to_string()),
        }
    }

    /// 记录 Execute 运行历史
    pub fn with_run_history(mut self, repo: ImportRunRepository) -> Self {
        self.run_history = Some(repo);
        self
    }

    pub async fn preview(&self, scope: &ImportScope) -> CompositeReport {
        self.preview_with_cancel(scope, CancellationToken::new())
            .await
    }

    pub async fn execute(&self, scope: &ImportScope) -> CompositeReport {
        self.execute_with_cancel(scope, CancellationToken::new())
            .await
    }

    /// 预览: 写入暂存在叠加层,运行结束即丢弃
    pub async fn preview_with_cancel(
        &self,
        scope: &ImportScope,
        cancel: CancellationToken,
    ) -> CompositeReport {
        let overlay: Arc<dyn EntityStore> = Arc::new(OverlayStore::new(self.store.clone()));
        self.run(RunMode::Preview, scope, overlay, cancel).await
    }

    /// 执行: 落库并记录运行历史
    pub async fn execute_with_cancel(
        &self,
        scope: &ImportScope,
        cancel: CancellationToken,
    ) -> CompositeReport {
        let report = self
            .run(RunMode::Execute, scope, self.store.clone(), cancel)
            .await;

        if let Some(repo) = &self.run_history {
            // 历史写入失败不影响本次运行结果
            if let Err(e) = repo.insert_run(&report) {
                error!(run_id = %report.run_id, error = %e, "运行历史写入失败");
            }
        }
        report
    }

    #[instrument(skip_all, fields(mode = %mode, run_id = tracing::field::Empty))]
    async fn run(
        &self,
        mode: RunMode,
        scope: &ImportScope,
        store: Arc<dyn EntityStore>,
        cancel: CancellationToken,
    ) -> CompositeReport {
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        let started_at = Utc::now();
        info!(
            stages = ?scope.stages,
            item_filter = ?scope.item_filter,
            mappings = self.mappings.len(),
            "导入运行开始"
        );

        let mut stages = Vec::with_capacity(scope.stages.len());
        let mut fatal_error: Option<String> = None;
        let mut halted_by_cancel = false;

        // ===== 配置校验 (任何阶段开始前) =====
        let rules = match RoutingRules::from_settings(&self.settings.routing) {
            Ok(rules) => Some(rules),
            Err(e) => {
                error!(error = %e, "路由规则配置无效,运行中止");
                fatal_error = Some(e.to_string());
                None
            }
        };

        let ctx = StageRunContext {
            remote: self.remote.clone(),
            store,
            resolver: CodeResolver::from_entries(self.mappings.iter().cloned()),
            worker_count: self.settings.import.worker_count,
            row_timeout: self.settings.import.row_timeout,
            prefetch_pages: self.settings.remote.prefetch_pages,
            cancel: cancel.clone(),
        };

        // BTreeSet 按 StageKind 声明顺序迭代,即依赖顺序
        for kind in scope.stages.iter().copied() {
            let rules = match &rules {
                Some(rules) if fatal_error.is_none() && !halted_by_cancel => rules,
                _ => {
                    stages.push(StageReport::not_started(kind));
                    continue;
                }
            };
            if cancel.is_cancelled() {
                halted_by_cancel = true;
                stages.push(StageReport::not_started(kind));
                continue;
            }

            let outcome = self.run_one(kind, rules, &ctx, scope).await;
            if let Some(err) = &outcome.fatal {
                if err.scope() == ErrorScope::Run {
                    error!(stage = %kind, error = %err, "运行级错误,后续阶段不再启动");
                } else {
                    warn!(stage = %kind, error = %err, "阶段中止,依赖阶段不再启动");
                }
                fatal_error = Some(format!("{}: {}", kind, err));
            }
            if outcome.report.status == StageStatus::Cancelled {
                halted_by_cancel = true;
            }
            stages.push(outcome.report);
        }

        let status = if halted_by_cancel {
            RunStatus::Cancelled
        } else {
            CompositeReport::derive_status(&stages, fatal_error.as_deref())
        };

        let report = CompositeReport {
            run_id,
            mode,
            status,
            started_at,
            finished_at: Utc::now(),
            stages,
            fatal_error,
        };

        let totals = report.totals();
        info!(
            status = %report.status,
            rows = totals.rows_seen,
            created = totals.created,
            updated = totals.updated,
            unchanged = totals.unchanged,
            skipped = totals.skipped,
            failed = totals.failed,
            warnings = totals.warnings,
            "导入运行结束"
        );
        report
    }

    /// 每次运行新建导入器,累计器不跨运行共享
    async fn run_one(
        &self,
        kind: StageKind,
        rules: &RoutingRules,
        ctx: &StageRunContext,
        scope: &ImportScope,
    ) -> StageOutcome {
        let source = self.settings.sources.for_stage(kind).clone();
        let page_size = self.settings.remote.page_size;
        match kind {
            StageKind::MasterData => {
                run_stage(Arc::new(PartImporter::new(source, page_size)), ctx, scope).await
            }
            StageKind::Routing => {
                let importer = RoutingImporter::new(source, page_size, rules.clone());
                run_stage(Arc::new(importer), ctx, scope).await
            }
            StageKind::Production => {
                let importer =
                    ProductionImporter::new(source, page_size, self.settings.require_operation);
                run_stage(Arc::new(importer), ctx, scope).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityKind;
    use crate::remote::{FixtureRemote, RemoteError, RemoteRow};
    use crate::repository::SqliteEntityStore;
    use serde_json::json;

    fn item_fixture() -> FixtureRemote {
        FixtureRemote::new().with_rows(
            "SLItems",
            vec![
                RemoteRow::from_pairs([("Item", json!("D123")), ("Description", json!("Shaft"))]),
                RemoteRow::from_pairs([("Item", json!("D124")), ("Description", json!("Gear"))]),
            ],
        )
    }

    fn orchestrator(remote: FixtureRemote, store: Arc<SqliteEntityStore>) -> ImportOrchestrator {
        let mut settings = ConnectorSettings::default();
        settings.retry.initial_backoff = std::time::Duration::from_millis(1);
        ImportOrchestrator::new(Arc::new(remote), store, Vec::new(), settings)
    }

    #[tokio::test]
    async fn test_preview_leaves_store_untouched() {
        let store = Arc::new(SqliteEntityStore::open_in_memory().unwrap());
        let orch = orchestrator(item_fixture(), store.clone());

        let report = orch.preview(&ImportScope::only([StageKind::MasterData])).await;
        assert_eq!(report.mode, RunMode::Preview);
        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.totals().created, 2);
        assert_eq!(store.count(EntityKind::Part).unwrap(), 0);

        let report = orch.execute(&ImportScope::only([StageKind::MasterData])).await;
        assert_eq!(report.totals().created, 2);
        assert_eq!(store.count(EntityKind::Part).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_marks_remaining_stages_not_started() {
        let remote = item_fixture();
        remote.fail_describe("SLItems", RemoteError::Auth("bad credentials".into()));
        let store = Arc::new(SqliteEntityStore::open_in_memory().unwrap());

        let report = orchestrator(remote, store).execute(&ImportScope::all()).await;
        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(report.stages.len(), 3);
        assert_eq!(report.stages[0].status, StageStatus::Aborted);
        assert!(report.stages[1..]
            .iter()
            .all(|s| s.status == StageStatus::NotStarted));
        assert!(report.fatal_error.is_some());
    }

    #[tokio::test]
    async fn test_invalid_rules_abort_before_any_stage() {
        let store = Arc::new(SqliteEntityStore::open_in_memory().unwrap());
        let mut settings = ConnectorSettings::default();
        settings.routing.cooperation_patterns = vec!["(".to_string()];
        let orch = ImportOrchestrator::new(Arc::new(item_fixture()), store, Vec::new(), settings);

        let report = orch.execute(&ImportScope::all()).await;
        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report
            .stages
            .iter()
            .all(|s| s.status == StageStatus::NotStarted));
    }

    #[test]
    fn test_rejected_report_marks_every_stage_not_started() {
        let scope = ImportScope::only([StageKind::Routing, StageKind::MasterData]);
        let report =
            ImportOrchestrator::rejected_report(RunMode::Preview, &scope, "routing.skip_patterns");

        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(report.mode, RunMode::Preview);
        assert_eq!(
            report.stages.iter().map(|s| s.stage).collect::<Vec<_>>(),
            vec![StageKind::MasterData, StageKind::Routing]
        );
        assert!(report
            .stages
            .iter()
            .all(|s| s.status == StageStatus::NotStarted));
        assert_eq!(report.fatal_error.as_deref(), Some("routing.skip_patterns"));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let store = Arc::new(SqliteEntityStore::open_in_memory().unwrap());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator(item_fixture(), store.clone())
            .execute_with_cancel(&ImportScope::all(), cancel)
            .await;
        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(report
            .stages
            .iter()
            .all(|s| s.status == StageStatus::NotStarted));
        assert_eq!(store.count(EntityKind::Part).unwrap(), 0);
    }
}
