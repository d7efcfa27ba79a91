// ==========================================
// ERP 导入连接器 - 导入层
// ==========================================
// 职责: 远程行 → 业务规则 → 本地实体对账
// 阶段: 物料主数据, 工艺路线, 生产执行记录
// ==========================================

// 模块声明
pub mod error;
pub mod field_reader;
pub mod part_importer;
pub mod production_importer;
pub mod reconcile;
pub mod routing_importer;
pub mod rules;
pub mod runner;
pub mod stage;

// 重导出核心类型
pub use error::{ErrorScope, ImportError, ImportResult};
pub use field_reader::FieldReader;
pub use part_importer::PartImporter;
pub use production_importer::ProductionImporter;
pub use routing_importer::RoutingImporter;
pub use rules::{RoutingClass, RoutingRules};
pub use runner::{run_stage, StageOutcome, StageRunContext};

// 重导出 Trait 接口
pub use stage::{ImportStage, ReconcileOutcome, RowContext, RowDecision, RowResult, StageTally};
