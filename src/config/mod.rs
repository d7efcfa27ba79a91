// ==========================================
// ERP 导入连接器 - 配置层
// ==========================================
// 职责: 运行配置读取与校验
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod settings;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, PASSWORD_ENV};
pub use settings::{
    ConnectorSettings, ImportSettings, RemoteSettings, RoutingRuleSettings, StageSource,
    StageSources,
};
