// ==========================================
// ERP 导入连接器 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供本地数据模型访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod code_mapping_repo;
pub mod entity_store;
pub mod error;
pub mod import_run_repo;
pub mod overlay_store;
pub mod sqlite_store;

// 重导出核心仓储
pub use code_mapping_repo::CodeMappingRepository;
pub use entity_store::{CreateOutcome, EntityStore};
pub use error::{RepositoryError, RepositoryResult};
pub use import_run_repo::{ImportRunRepository, ImportRunSummary};
pub use overlay_store::OverlayStore;
pub use sqlite_store::SqliteEntityStore;
