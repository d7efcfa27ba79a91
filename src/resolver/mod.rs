// ==========================================
// ERP 导入连接器 - 代码解析层
// ==========================================
// 职责: 外部工作中心代码 → 内部 id (精确 + 前缀回落 + 预热缓存)
// ==========================================

pub mod code_resolver;

pub use code_resolver::{
    normalize_code, CodeMappingTable, CodeResolver, Resolution, ResolvedCodes, MIN_PREFIX_LEN,
};
