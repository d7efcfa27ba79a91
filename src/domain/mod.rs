// ==========================================
// ERP 导入连接器 - 领域模型层
// ==========================================
// 职责: 定义导入实体、自然键、报告结构
// 红线: 不含数据访问逻辑,不含远程调用
// ==========================================

pub mod code_mapping;
pub mod entity;
pub mod operation;
pub mod part;
pub mod production;
pub mod report;
pub mod scope;
pub mod types;

// 重导出核心类型
pub use code_mapping::CodeMappingEntry;
pub use entity::{Entity, EntityKind, NaturalKey};
pub use operation::Operation;
pub use part::Part;
pub use production::{ProductionKey, ProductionRecord};
pub use report::{
    ChangeAction, CompositeReport, EntityChange, FailureKind, ImportWarning, ReportTotals,
    RowFailure, RowRef, RowSkip, StageReport, WarningKind,
};
pub use scope::ImportScope;
pub use types::{RunMode, RunStatus, StageKind, StageStatus};
