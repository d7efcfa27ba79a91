// ==========================================
// ERP 导入连接器 - 工作中心代码解析器
// ==========================================
// 算法:
// 1. 精确匹配
// 2. 前缀匹配: 在允许前缀匹配的条目中取最长前缀 (条目代码长度 >= 2)
//    等长候选时先注册者优先
// 3. 无候选 → Unresolved (记为警告,不是错误)
// 红线: 映射表在一次运行内不可变;预热后的缓存只读
// ==========================================

use crate::domain::CodeMappingEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 前缀匹配条目的最小代码长度
pub const MIN_PREFIX_LEN: usize = 2;

/// 代码标准化 (TRIM + UPPER)
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Exact(i64),
    Prefix(i64),
    Unresolved,
}

impl Resolution {
    pub fn work_center_id(&self) -> Option<i64> {
        match self {
            Resolution::Exact(id) | Resolution::Prefix(id) => Some(*id),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved)
    }
}

// ==========================================
// CodeMappingTable - 不可变映射表
// ==========================================
#[derive(Debug, Default)]
pub struct CodeMappingTable {
    exact: HashMap<String, i64>,
    prefixes: Vec<(String, i64)>, // 注册顺序
}

impl CodeMappingTable {
    pub fn new(entries: impl IntoIterator<Item = CodeMappingEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            let code = normalize_code(&entry.code);
            if code.is_empty() {
                continue;
            }
            if table.exact.contains_key(&code) {
                warn!(code = %code, "代码映射重复,保留首个条目");
                continue;
            }
            table.exact.insert(code.clone(), entry.work_center_id);
            if entry.prefix_match && code.chars().count() >= MIN_PREFIX_LEN {
                table.prefixes.push((code, entry.work_center_id));
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    fn lookup(&self, code: &str) -> Resolution {
        if let Some(id) = self.exact.get(code) {
            return Resolution::Exact(*id);
        }

        let mut best: Option<(usize, i64)> = None;
        for (prefix, id) in &self.prefixes {
            if !code.starts_with(prefix.as_str()) {
                continue;
            }
            let len = prefix.chars().count();
            // 严格大于: 等长时保留先注册者
            if best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, *id));
            }
        }

        match best {
            Some((_, id)) => Resolution::Prefix(id),
            None => Resolution::Unresolved,
        }
    }
}

// ==========================================
// CodeResolver
// ==========================================
#[derive(Debug, Clone)]
pub struct CodeResolver {
    table: Arc<CodeMappingTable>,
}

impl CodeResolver {
    pub fn new(table: Arc<CodeMappingTable>) -> Self {
        Self { table }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = CodeMappingEntry>) -> Self {
        Self::new(Arc::new(CodeMappingTable::new(entries)))
    }

    /// 解析单个外部代码
    pub fn resolve(&self, code: &str) -> Resolution {
        let code = normalize_code(code);
        if code.is_empty() {
            return Resolution::Unresolved;
        }
        self.table.lookup(&code)
    }

    /// 批量预解析去重后的代码,返回只读快照
    pub fn warmup<I, S>(&self, codes: I) -> ResolvedCodes
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cache = HashMap::new();
        for code in codes {
            let code = normalize_code(code.as_ref());
            if code.is_empty() || cache.contains_key(&code) {
                continue;
            }
            let resolution = self.table.lookup(&code);
            cache.insert(code, resolution);
        }

        let unresolved = cache.values().filter(|r| !r.is_resolved()).count();
        debug!(codes = cache.len(), unresolved, "代码解析预热完成");

        ResolvedCodes {
            cache: Arc::new(cache),
            resolver: self.clone(),
        }
    }
}

// ==========================================
// ResolvedCodes - 预热快照
// ==========================================
// 并发转换期间无锁只读
#[derive(Debug, Clone)]
pub struct ResolvedCodes {
    cache: Arc<HashMap<String, Resolution>>,
    resolver: CodeResolver,
}

impl ResolvedCodes {
    pub fn lookup(&self, code: &str) -> Resolution {
        let key = normalize_code(code);
        match self.cache.get(&key) {
            Some(resolution) => *resolution,
            None => {
                debug!(code = %key, "代码未预热,直接查映射表");
                self.resolver.table.lookup(&key)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
