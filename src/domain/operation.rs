// ==========================================
// ERP 导入连接器 - 工序 (Operation)
// ==========================================
// 自然键: (article_number, seq)
// 红线: 所属物料必须先存在于本地
// ==========================================

use crate::domain::entity::float_eq;
use serde::{Deserialize, Serialize};

/// 外协工序的人员配置 (%)
pub const COOPERATION_MANNING_PCT: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    // ===== 自然键 =====
    pub article_number: String, // 所属物料号
    pub seq: i32,               // 工序号

    // ===== 工作中心 =====
    pub work_center_id: Option<i64>,      // 内部工作中心 (未解析时为 NULL)
    pub work_center_code: Option<String>, // 外部工作中心代码 (原值)

    // ===== 工艺参数 =====
    pub planned_time: f64,       // 计划工时 (h)
    pub is_cooperation: bool,    // 外协标记
    pub manning_pct: f64,        // 人员配置 (%)
    pub description: Option<String>,
}

impl Operation {
    /// 比较导入字段,返回发生变化的字段名
    pub fn diff(&self, existing: &Operation) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.work_center_id != existing.work_center_id {
            changed.push("work_center_id");
        }
        if self.work_center_code != existing.work_center_code {
            changed.push("work_center_code");
        }
        if !float_eq(Some(self.planned_time), Some(existing.planned_time)) {
            changed.push("planned_time");
        }
        if self.is_cooperation != existing.is_cooperation {
            changed.push("is_cooperation");
        }
        if !float_eq(Some(self.manning_pct), Some(existing.manning_pct)) {
            changed.push("manning_pct");
        }
        if self.description != existing.description {
            changed.push("description");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_detects_work_center_change() {
        let existing = Operation {
            article_number: "D123".to_string(),
            seq: 10,
            work_center_id: None,
            work_center_code: Some("M01".to_string()),
            planned_time: 0.5,
            is_cooperation: false,
            manning_pct: 100.0,
            description: None,
        };
        let mut incoming = existing.clone();
        incoming.work_center_id = Some(80000001);

        assert_eq!(incoming.diff(&existing), vec!["work_center_id"]);
        assert!(existing.diff(&existing).is_empty());
    }
}
