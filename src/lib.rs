// ==========================================
// ERP 导入连接器 - 核心库
// ==========================================
// 技术栈: Rust + Tokio + SQLite
// 系统定位: 外部 ERP → 本地生产数据的单向同步
// 阶段: 物料主数据 → 工艺路线 → 生产执行记录
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体、自然键与报告
pub mod domain;

// 配置层 - config_kv 配置快照
pub mod config;

// 远程接口层 - ERP IDO 访问
pub mod remote;

// 代码解析层 - 工作中心代码映射
pub mod resolver;

// 数据仓储层 - 本地实体存储
pub mod repository;

// 导入层 - 阶段契约与三个导入器
pub mod importer;

// 编排层 - 预览/执行
pub mod engine;

// 数据库基础设施（连接初始化/PRAGMA/Schema）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use config::{ConfigManager, ConnectorSettings};
pub use domain::{
    CompositeReport, ImportScope, RunMode, RunStatus, StageKind, StageReport, StageStatus,
};
pub use engine::ImportOrchestrator;
pub use importer::{ImportError, ImportResult};
pub use remote::{FixtureRemote, IdoClient, RemoteClient, RemoteError};
pub use repository::{
    CodeMappingRepository, EntityStore, ImportRunRepository, RepositoryError, SqliteEntityStore,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "ERP 导入连接器";
