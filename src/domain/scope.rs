// ==========================================
// ERP 导入连接器 - 导入范围
// ==========================================
// 选择要运行的阶段 + 可选的物料过滤条件
// 阶段执行顺序始终为 主数据 → 工艺路线 → 生产记录 (BTreeSet 按 StageKind 排序)
// ==========================================

use crate::domain::types::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportScope {
    pub stages: BTreeSet<StageKind>,
    pub item_filter: Option<String>, // 与各阶段远程过滤条件 AND 组合
}

impl Default for ImportScope {
    fn default() -> Self {
        Self::all()
    }
}

impl ImportScope {
    pub fn all() -> Self {
        Self {
            stages: StageKind::all().into_iter().collect(),
            item_filter: None,
        }
    }

    pub fn only(stages: impl IntoIterator<Item = StageKind>) -> Self {
        Self {
            stages: stages.into_iter().collect(),
            item_filter: None,
        }
    }

    pub fn with_item_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.item_filter = if filter.trim().is_empty() {
            None
        } else {
            Some(filter)
        };
        self
    }

    pub fn includes(&self, stage: StageKind) -> bool {
        self.stages.contains(&stage)
    }
}
