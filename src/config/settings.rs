// ==========================================
// ERP 导入连接器 - 运行配置快照
// ==========================================
// 生命周期: 运行开始时由 ConfigManager 加载一次,运行期间只读
// ==========================================

use crate::domain::StageKind;
use crate::remote::{IdoClientConfig, RetryPolicy};
use std::time::Duration;

/// 远程接口配置
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSettings {
    pub base_url: String,
    pub config_name: String,
    pub username: String,
    pub password: String,
    pub page_size: u32,
    pub prefetch_pages: usize,
    pub timeout: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            config_name: String::new(),
            username: String::new(),
            password: String::new(),
            page_size: 200,
            prefetch_pages: 2,
            timeout: Duration::from_millis(30_000),
        }
    }
}

impl RemoteSettings {
    pub fn ido_client_config(&self) -> IdoClientConfig {
        IdoClientConfig {
            base_url: self.base_url.clone(),
            config_name: self.config_name.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }
}

/// 每个阶段的远程对象与默认过滤
#[derive(Debug, Clone, PartialEq)]
pub struct StageSource {
    pub object: String,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSources {
    pub master_data: StageSource,
    pub routing: StageSource,
    pub production: StageSource,
}

impl Default for StageSources {
    fn default() -> Self {
        Self {
            master_data: StageSource {
                object: "SLItems".to_string(),
                filter: None,
            },
            routing: StageSource {
                object: "SLJobRoutes".to_string(),
                filter: Some("Type = 'S'".to_string()),
            },
            production: StageSource {
                object: "SLJobTrans".to_string(),
                filter: Some("TransType = 'R'".to_string()),
            },
        }
    }
}

impl StageSources {
    pub fn for_stage(&self, stage: StageKind) -> &StageSource {
        match stage {
            StageKind::MasterData => &self.master_data,
            StageKind::Routing => &self.routing,
            StageKind::Production => &self.production,
        }
    }
}

/// 行处理并发与超时
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub worker_count: usize,
    pub row_timeout: Duration,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            row_timeout: Duration::from_millis(10_000),
        }
    }
}

/// 工艺路线业务规则 (正则)
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingRuleSettings {
    pub skip_patterns: Vec<String>,
    pub cooperation_patterns: Vec<String>,
}

impl Default for RoutingRuleSettings {
    fn default() -> Self {
        Self {
            skip_patterns: vec!["^UEB".to_string(), "^CAD".to_string(), "^CAM".to_string()],
            cooperation_patterns: vec!["^KOO".to_string()],
        }
    }
}

/// 连接器配置快照
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorSettings {
    pub remote: RemoteSettings,
    pub retry: RetryPolicy,
    pub import: ImportSettings,
    pub sources: StageSources,
    pub routing: RoutingRuleSettings,
    pub require_operation: bool, // 生产记录是否要求工序已存在
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            remote: RemoteSettings::default(),
            retry: RetryPolicy::default(),
            import: ImportSettings::default(),
            sources: StageSources::default(),
            routing: RoutingRuleSettings::default(),
            require_operation: true,
        }
    }
}
