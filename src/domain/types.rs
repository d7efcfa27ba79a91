// ==========================================
// ERP 导入连接器 - 领域类型定义
// ==========================================
// 职责: 阶段/运行模式/运行状态等枚举
// 序列化格式: kebab-case / SCREAMING_SNAKE_CASE (与 import_run 表一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 导入阶段 (Stage Kind)
// ==========================================
// 红线: 声明顺序即依赖顺序 (主数据 → 工艺路线 → 生产记录)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageKind {
    MasterData, // 物料主数据
    Routing,    // 工艺路线 (工序)
    Production, // 生产执行记录
}

impl StageKind {
    /// 按依赖顺序返回全部阶段
    pub fn all() -> [StageKind; 3] {
        [StageKind::MasterData, StageKind::Routing, StageKind::Production]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::MasterData => "master-data",
            StageKind::Routing => "routing",
            StageKind::Production => "production",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "master-data" | "master_data" | "masterdata" => Ok(StageKind::MasterData),
            "routing" => Ok(StageKind::Routing),
            "production" => Ok(StageKind::Production),
            other => Err(format!("未知导入阶段: {}", other)),
        }
    }
}

// ==========================================
// 运行模式 (Run Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Preview, // 预览: 模拟对账,不落库
    Execute, // 执行: 完整落库
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Preview => write!(f, "PREVIEW"),
            RunMode::Execute => write!(f, "EXECUTE"),
        }
    }
}

// ==========================================
// 阶段状态 (Stage Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Completed,             // 全部行处理成功
    CompletedWithFailures, // 存在行级失败,阶段本身完成
    Aborted,               // 阶段级致命错误中止
    Cancelled,             // 协作式取消
    NotStarted,            // 因前序中止/取消未启动
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed => write!(f, "COMPLETED"),
            StageStatus::CompletedWithFailures => write!(f, "COMPLETED_WITH_FAILURES"),
            StageStatus::Aborted => write!(f, "ABORTED"),
            StageStatus::Cancelled => write!(f, "CANCELLED"),
            StageStatus::NotStarted => write!(f, "NOT_STARTED"),
        }
    }
}

// ==========================================
// 运行状态 (Run Status)
// ==========================================
// 红线: 部分失败必须如实上报,不得视为完全成功
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Succeeded,
    PartiallyFailed,
    Aborted,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "SUCCEEDED"),
            RunStatus::PartiallyFailed => write!(f, "PARTIALLY_FAILED"),
            RunStatus::Aborted => write!(f, "ABORTED"),
            RunStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "SUCCEEDED" => Ok(RunStatus::Succeeded),
            "PARTIALLY_FAILED" => Ok(RunStatus::PartiallyFailed),
            "ABORTED" => Ok(RunStatus::Aborted),
            "CANCELLED" => Ok(RunStatus::Cancelled),
            other => Err(format!("未知运行状态: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_follows_dependencies() {
        let mut stages = vec![StageKind::Production, StageKind::MasterData, StageKind::Routing];
        stages.sort();
        assert_eq!(stages, StageKind::all().to_vec());
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("master-data".parse::<StageKind>(), Ok(StageKind::MasterData));
        assert_eq!(" Routing ".parse::<StageKind>(), Ok(StageKind::Routing));
        assert!("bom".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_run_status_round_trip_text() {
        for status in [
            RunStatus::Succeeded,
            RunStatus::PartiallyFailed,
            RunStatus::Aborted,
            RunStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<RunStatus>(), Ok(status));
        }
    }
}
