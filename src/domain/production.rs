// ==========================================
// ERP 导入连接器 - 生产执行记录 (ProductionRecord)
// ==========================================
// 红线: 仅追加,插入后永不修改
// 对账方式: 按完整自然键去重 (job, batch, 工序引用, 日期)
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductionKey {
    pub job: String,            // 生产订单号
    pub batch: String,          // 批次 (订单后缀)
    pub article_number: String, // 工序引用: 物料号
    pub operation_seq: i32,     // 工序引用: 工序号
    pub date: NaiveDate,        // 报工日期
}

impl fmt::Display for ProductionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.job, self.batch, self.article_number, self.operation_seq, self.date
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub key: ProductionKey,
    pub actual_time: f64,             // 实际工时 (h)
    pub machine_code: Option<String>, // 外部机台代码
    pub work_center_id: Option<i64>,  // 解析后的工作中心
}
