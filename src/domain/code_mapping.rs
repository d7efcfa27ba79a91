// ==========================================
// ERP 导入连接器 - 工作中心代码映射
// ==========================================
// 用途: 外部工作中心代码 → 内部 WorkCenter id
// 来源: code_mapping 表,每次运行开始加载一次,运行期间只读
// ==========================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeMappingEntry {
    pub code: String,        // 外部代码
    pub work_center_id: i64, // 内部工作中心 id
    pub prefix_match: bool,  // 是否允许前缀匹配
}

impl CodeMappingEntry {
    pub fn exact(code: impl Into<String>, work_center_id: i64) -> Self {
        Self {
            code: code.into(),
            work_center_id,
            prefix_match: false,
        }
    }

    pub fn prefix(code: impl Into<String>, work_center_id: i64) -> Self {
        Self {
            code: code.into(),
            work_center_id,
            prefix_match: true,
        }
    }
}
