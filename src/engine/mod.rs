// ==========================================
// ERP 导入连接器 - 编排层
// ==========================================
// 职责: 按依赖顺序调度导入阶段,产出运行汇总报告
// 红线: 编排层不拼 SQL,不解析远程行
// ==========================================

pub mod orchestrator;

pub use orchestrator::ImportOrchestrator;
