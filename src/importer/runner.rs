// ==========================================
// ERP 导入连接器 - 阶段运行器
// ==========================================
// 流程:
// 1. describe_schema 校验期望字段 → 不符则阶段中止
// 2. 分页流式拉取 (后台预取)
// 3. 每页: 代码预热 → buffer_unordered 并发处理行 (转换 + 对账, 受行超时约束)
// 4. 调度每行前检查取消令牌;已在处理的行允许完成
// 5. 分页流出错 → 阶段中止,保留已累计结果
// ==========================================

use crate::domain::{ImportScope, StageStatus};
use crate::importer::error::ImportError;
use crate::importer::stage::{ImportStage, RowContext, RowDecision, RowResult};
use crate::remote::{RemoteClient, RemoteRow};
use crate::repository::EntityStore;
use crate::resolver::{CodeResolver, ResolvedCodes};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 运行器依赖 (每次运行构造一次)
#[derive(Clone)]
pub struct StageRunContext {
    pub remote: Arc<dyn RemoteClient>,
    pub store: Arc<dyn EntityStore>,
    pub resolver: CodeResolver,
    pub worker_count: usize,
    pub row_timeout: Duration,
    pub prefetch_pages: usize,
    pub cancel: CancellationToken,
}

/// 阶段运行结果: 报告 + 导致中止的错误
#[derive(Debug)]
pub struct StageOutcome {
    pub report: crate::domain::StageReport,
    pub fatal: Option<ImportError>,
}

/// 运行单个导入阶段
#[instrument(skip_all, fields(stage = %stage.kind()))]
pub async fn run_stage<S>(stage: Arc<S>, ctx: &StageRunContext, scope: &ImportScope) -> StageOutcome
where
    S: ImportStage + 'static,
{
    let started = Instant::now();
    let query = stage.query(scope);
    info!(object = %query.object, filter = ?query.filter, "阶段开始");

    // ===== 1. 结构校验 =====
    let fatal = match ctx.remote.describe_schema(&query.object).await {
        Err(e) => Some(ImportError::from(e)),
        Ok(schema) => {
            let issues = schema.check(stage.required_fields());
            if issues.is_empty() {
                None
            } else {
                Some(ImportError::SchemaMismatch {
                    object: query.object.clone(),
                    issues,
                })
            }
        }
    };
    if let Some(err) = fatal {
        return abort(stage.as_ref(), err, started);
    }

    // ===== 2. 分页拉取 =====
    let mut pages = stage.fetch(
        ctx.remote.clone(),
        query.clone(),
        ctx.prefetch_pages,
        ctx.cancel.clone(),
    );
    let mut next_row_number = 0usize;
    let mut fatal: Option<ImportError> = None;

    while let Some(page) = pages.next().await {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                fatal = Some(ImportError::from(e));
                break;
            }
        };

        // ===== 3. 预热 + 并发处理 =====
        let codes = ctx.resolver.warmup(
            page.rows
                .iter()
                .flat_map(|row| stage.codes_for_warmup(row)),
        );
        let first_row = next_row_number + 1;
        next_row_number += page.rows.len();
        debug!(rows = page.rows.len(), first_row, codes = codes.len(), "处理分页");

        stream::iter(page.rows.into_iter().enumerate())
            .map(|(offset, row)| {
                process_row(
                    stage.clone(),
                    ctx.clone(),
                    row,
                    first_row + offset,
                    codes.clone(),
                )
            })
            .buffer_unordered(ctx.worker_count.max(1))
            .for_each(|_| async {})
            .await;

        if ctx.cancel.is_cancelled() {
            break;
        }
    }

    // ===== 5. 收尾 =====
    let cancelled = ctx.cancel.is_cancelled();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    stage.tally().finish(|report| {
        report.elapsed_ms = elapsed_ms;
        report.fatal_error = fatal.as_ref().map(|err| err.to_string());
        report.status = if fatal.is_some() {
            StageStatus::Aborted
        } else if cancelled {
            StageStatus::Cancelled
        } else if report.failed > 0 {
            StageStatus::CompletedWithFailures
        } else {
            StageStatus::Completed
        };
    });

    let report = stage.report();
    match &fatal {
        Some(err) => error!(error = %err, rows = report.rows_seen, "阶段中止"),
        None => info!(
            status = %report.status,
            rows = report.rows_seen,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            elapsed_ms,
            "阶段结束"
        ),
    }

    StageOutcome { report, fatal }
}

fn abort<S: ImportStage>(stage: &S, err: ImportError, started: Instant) -> StageOutcome {
    error!(error = %err, "阶段启动失败");
    stage.tally().finish(|report| {
        report.status = StageStatus::Aborted;
        report.fatal_error = Some(err.to_string());
        report.elapsed_ms = started.elapsed().as_millis() as u64;
    });
    StageOutcome {
        report: stage.report(),
        fatal: Some(err),
    }
}

/// 处理单行 (取消检查 → 转换 → 对账),结果记入累计器
async fn process_row<S>(
    stage: Arc<S>,
    ctx: StageRunContext,
    row: RemoteRow,
    row_number: usize,
    codes: ResolvedCodes,
) where
    S: ImportStage + 'static,
{
    // 取消后不再调度新行
    if ctx.cancel.is_cancelled() {
        return;
    }

    let work = async {
        let row_ctx = RowContext { row_number, codes };
        match stage.transform(&row, &row_ctx) {
            RowDecision::Skip { reason } => RowResult::Skipped { key: None, reason },
            RowDecision::Reject(error) => RowResult::Failed { key: None, error },
            RowDecision::Accept {
                key,
                candidate,
                warnings,
            } => match stage.reconcile(candidate, ctx.store.as_ref()).await {
                Ok(outcome) => RowResult::Reconciled {
                    key,
                    outcome,
                    warnings,
                },
                Err(error) => RowResult::Failed {
                    key: Some(key),
                    error,
                },
            },
        }
    };

    let result = match tokio::time::timeout(ctx.row_timeout, work).await {
        Ok(result) => result,
        Err(_) => RowResult::Failed {
            key: None,
            error: ImportError::Timeout(ctx.row_timeout.as_millis() as u64),
        },
    };

    match &result {
        RowResult::Failed { key, error } => {
            warn!(row = row_number, key = ?key.as_ref().map(|k| k.to_string()), error = %error, "行处理失败")
        }
        RowResult::Skipped { reason, .. } => debug!(row = row_number, reason = %reason, "行已跳过"),
        RowResult::Reconciled { key, outcome, .. } => {
            debug!(row = row_number, key = %key, outcome = ?outcome, "行已对账")
        }
    }

    stage.tally().record(row_number, stage.entity_kind(), result);
}
