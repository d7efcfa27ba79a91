// ==========================================
// ERP 导入连接器 - 物料主数据 (Part)
// ==========================================
// 自然键: article_number (唯一)
// 用途: 主数据导入器写入,工艺路线/生产记录只读引用
// 红线: 连接器从不删除物料
// ==========================================

use crate::domain::entity::float_eq;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub article_number: String,   // 物料号 (自然键)
    pub name: String,             // 名称
    pub material: Option<String>, // 材质
    pub weight: Option<f64>,      // 单重 (kg)
}

impl Part {
    /// 比较导入字段,返回发生变化的字段名
    pub fn diff(&self, existing: &Part) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.name != existing.name {
            changed.push("name");
        }
        if self.material != existing.material {
            changed.push("material");
        }
        if !float_eq(self.weight, existing.weight) {
            changed.push("weight");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shaft() -> Part {
        Part {
            article_number: "D123".to_string(),
            name: "Shaft".to_string(),
            material: Some("42CrMo4".to_string()),
            weight: Some(1.25),
        }
    }

    #[test]
    fn test_diff_unchanged() {
        assert!(shaft().diff(&shaft()).is_empty());
    }

    #[test]
    fn test_diff_reports_changed_fields() {
        let mut incoming = shaft();
        incoming.name = "Shaft long".to_string();
        incoming.weight = None;

        assert_eq!(incoming.diff(&shaft()), vec!["name", "weight"]);
    }
}
