// ==========================================
// ERP 导入连接器 - 命令行入口
// ==========================================
// 子命令: init-db / preview / execute / history
// 输出: 报告以 JSON 写 stdout,日志写 stderr
// 退出码: 运行中止 → 2
// ==========================================

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use erp_import_connector::{
    db, logging, CodeMappingRepository, CompositeReport, ConfigManager, FixtureRemote, IdoClient,
    ImportError, ImportOrchestrator, ImportRunRepository, ImportScope, RemoteClient, RunMode,
    RunStatus, SqliteEntityStore, StageKind,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DB_PATH_ENV: &str = "ERP_IMPORT_DB_PATH";
const DB_FILE_NAME: &str = "erp_import.db";

#[derive(Parser, Debug)]
#[command(name = "erp-import")]
#[command(about = "外部 ERP 导入连接器: 物料主数据 / 工艺路线 / 生产执行记录")]
#[command(version)]
struct Cli {
    /// 本地 SQLite 数据库路径
    #[arg(long, global = true, env = DB_PATH_ENV)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 建表并记录 schema 版本
    InitDb,

    /// 预览导入 (模拟对账,不落库)
    Preview(RunArgs),

    /// 执行导入并记录运行历史
    Execute(RunArgs),

    /// 列出最近的执行记录
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// 导入阶段,可重复;缺省为全部阶段
    #[arg(long = "stage", value_name = "STAGE")]
    stages: Vec<StageKind>,

    /// 附加到每个阶段远程过滤条件的表达式
    #[arg(long)]
    filter: Option<String>,

    /// 使用离线 JSON 数据代替远程 ERP
    #[arg(long, value_name = "FILE")]
    fixture: Option<PathBuf>,
}

impl RunArgs {
    fn scope(&self) -> ImportScope {
        let scope = if self.stages.is_empty() {
            ImportScope::all()
        } else {
            ImportScope::only(self.stages.iter().copied())
        };
        match &self.filter {
            Some(filter) => scope.with_item_filter(filter.as_str()),
            None => scope,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let db_path = resolve_db_path(cli.db.clone());
    info!(version = erp_import_connector::VERSION, db = %db_path.display(), "ERP 导入连接器启动");
    let conn = open_database(&db_path)?;

    match cli.command {
        Commands::InitDb => {
            let version = {
                let guard = conn
                    .lock()
                    .map_err(|e| anyhow::anyhow!("数据库锁获取失败: {}", e))?;
                db::read_schema_version(&guard)?
            };
            println!(
                "{}",
                serde_json::json!({ "db": db_path.display().to_string(), "schema_version": version })
            );
        }
        Commands::History { limit } => {
            let runs = ImportRunRepository::new(conn).recent_runs(limit)?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
        Commands::Preview(args) => {
            let report = run_import(conn, &args, false).await?;
            finish(&report)?;
        }
        Commands::Execute(args) => {
            let report = run_import(conn, &args, true).await?;
            finish(&report)?;
        }
    }
    Ok(())
}

/// 数据库路径优先级: --db / 环境变量 → 用户数据目录 → 当前目录
fn resolve_db_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    match dirs::data_dir() {
        Some(dir) => dir.join("erp-import-connector").join(DB_FILE_NAME),
        None => PathBuf::from(DB_FILE_NAME),
    }
}

fn open_database(path: &PathBuf) -> Result<Arc<Mutex<rusqlite::Connection>>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("无法创建数据目录 {}", parent.display()))?;
    }
    let path_str = path.to_string_lossy();
    let conn = db::open_sqlite_connection(&path_str)
        .with_context(|| format!("无法打开数据库 {}", path.display()))?;
    db::init_schema(&conn).context("数据库建表失败")?;
    Ok(Arc::new(Mutex::new(conn)))
}

async fn run_import(
    conn: Arc<Mutex<rusqlite::Connection>>,
    args: &RunArgs,
    execute: bool,
) -> Result<CompositeReport> {
    let scope = args.scope();
    let settings = match ConfigManager::from_connection(conn.clone()).load_settings() {
        Ok(settings) => settings,
        Err(e @ ImportError::ConfigValue { .. }) => {
            // 配置值非法 → 运行中止,仍输出汇总报告
            error!(error = %e, "配置无效,运行中止");
            let mode = if execute { RunMode::Execute } else { RunMode::Preview };
            let report = ImportOrchestrator::rejected_report(mode, &scope, &e.to_string());
            if execute {
                if let Err(e) = ImportRunRepository::new(conn).insert_run(&report) {
                    error!(run_id = %report.run_id, error = %e, "运行历史写入失败");
                }
            }
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
    };
    let mappings = CodeMappingRepository::new(conn.clone()).load_entries()?;

    let remote: Arc<dyn RemoteClient> = match &args.fixture {
        Some(path) => Arc::new(
            FixtureRemote::from_path(path)
                .with_context(|| format!("无法读取离线数据 {}", path.display()))?,
        ),
        None => {
            if settings.remote.base_url.is_empty() {
                anyhow::bail!("未配置 remote.base_url,请写入 config_kv 或使用 --fixture");
            }
            Arc::new(IdoClient::new(settings.remote.ido_client_config())?)
        }
    };

    let store = Arc::new(SqliteEntityStore::from_connection(conn.clone()));
    let orchestrator = ImportOrchestrator::new(remote, store, mappings, settings)
        .with_run_history(ImportRunRepository::new(conn));

    // Ctrl+C → 停止调度新行,已在处理的行完成后返回报告
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("收到 Ctrl+C,取消导入");
            signal_token.cancel();
        }
    });

    let report = if execute {
        orchestrator.execute_with_cancel(&scope, cancel).await
    } else {
        orchestrator.preview_with_cancel(&scope, cancel).await
    };
    Ok(report)
}

fn finish(report: &CompositeReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if report.status == RunStatus::Aborted {
        std::process::exit(2);
    }
    Ok(())
}
