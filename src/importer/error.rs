// ==========================================
// ERP 导入连接器 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分级: 行级 (隔离) / 阶段级 (中止本阶段及后续阶段) / 运行级
// ==========================================

use crate::domain::FailureKind;
use crate::remote::RemoteError;
use crate::repository::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误影响范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorScope {
    Row,   // 记为行失败,继续处理后续行
    Stage, // 中止当前阶段及依赖阶段
    Run,   // 中止整个运行
}

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 远程错误 =====
    #[error("远程连接失败: {0}")]
    Connectivity(String),

    #[error("远程认证失败: {0}")]
    Auth(String),

    #[error("远程协议错误: {0}")]
    Protocol(String),

    #[error("远程对象结构不符 (object={object}): {}", .issues.join("; "))]
    SchemaMismatch { object: String, issues: Vec<String> },

    // ===== 行级错误 =====
    #[error("依赖未满足: {entity} {key} 不存在")]
    DependencyNotSatisfied { entity: String, key: String },

    #[error("校验失败 (字段 {field}): {message}")]
    Validation { field: String, message: String },

    #[error("行处理超时 ({0} ms)")]
    Timeout(u64),

    #[error("持久化失败: {0}")]
    Repository(#[from] RepositoryError),

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigRead { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValue {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing_field(field: &str) -> Self {
        ImportError::validation(field, "必填字段缺失")
    }

    pub fn dependency(entity: impl Into<String>, key: impl Into<String>) -> Self {
        ImportError::DependencyNotSatisfied {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// 错误影响范围 (行内出现时)
    pub fn scope(&self) -> ErrorScope {
        match self {
            ImportError::Auth(_) => ErrorScope::Run,
            ImportError::Connectivity(_)
            | ImportError::Protocol(_)
            | ImportError::SchemaMismatch { .. }
            | ImportError::ConfigRead { .. }
            | ImportError::ConfigValue { .. } => ErrorScope::Stage,
            ImportError::DependencyNotSatisfied { .. }
            | ImportError::Validation { .. }
            | ImportError::Timeout(_)
            | ImportError::Repository(_)
            | ImportError::Internal(_)
            | ImportError::Other(_) => ErrorScope::Row,
        }
    }

    /// 行级失败分类 (报告用)
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ImportError::DependencyNotSatisfied { .. } => FailureKind::DependencyNotSatisfied,
            ImportError::Validation { .. } => FailureKind::Validation,
            ImportError::Timeout(_) => FailureKind::Timeout,
            ImportError::Repository(_) => FailureKind::Persistence,
            _ => FailureKind::Internal,
        }
    }
}

impl From<RemoteError> for ImportError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Connectivity(msg) => ImportError::Connectivity(msg),
            RemoteError::Auth(msg) => ImportError::Auth(msg),
            RemoteError::Protocol(msg) => ImportError::Protocol(msg),
        }
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_classification() {
        assert_eq!(
            ImportError::from(RemoteError::Auth("401".into())).scope(),
            ErrorScope::Run
        );
        assert_eq!(
            ImportError::from(RemoteError::Connectivity("reset".into())).scope(),
            ErrorScope::Stage
        );
        assert_eq!(
            ImportError::SchemaMismatch {
                object: "SLItems".into(),
                issues: vec!["缺少字段 Item".into()],
            }
            .scope(),
            ErrorScope::Stage
        );
        assert_eq!(
            ImportError::dependency("PART", "D999").scope(),
            ErrorScope::Row
        );
        assert_eq!(ImportError::Timeout(10).scope(), ErrorScope::Row);
    }

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            ImportError::dependency("PART", "D999").failure_kind(),
            FailureKind::DependencyNotSatisfied
        );
        assert_eq!(
            ImportError::missing_field("Item").failure_kind(),
            FailureKind::Validation
        );
        assert_eq!(
            ImportError::Repository(RepositoryError::LockError("x".into())).failure_kind(),
            FailureKind::Persistence
        );
    }

    #[test]
    fn test_schema_mismatch_message() {
        let err = ImportError::SchemaMismatch {
            object: "SLJobRoutes".into(),
            issues: vec!["缺少字段 OperNum".into(), "字段 RunHrs 类型不符".into()],
        };
        assert_eq!(
            err.to_string(),
            "远程对象结构不符 (object=SLJobRoutes): 缺少字段 OperNum; 字段 RunHrs 类型不符"
        );
    }
}
