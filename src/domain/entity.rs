// ==========================================
// ERP 导入连接器 - 实体与自然键
// ==========================================
// 用途: 持久化协作接口 (EntityStore) 的统一入参
// ==========================================

use crate::domain::operation::Operation;
use crate::domain::part::Part;
use crate::domain::production::{ProductionKey, ProductionRecord};
use serde::{Deserialize, Serialize};
use std::fmt;

const FLOAT_TOLERANCE: f64 = 1e-9;

/// 浮点字段比较 (容忍 SQLite REAL 往返误差)
pub fn float_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => (x - y).abs() <= FLOAT_TOLERANCE,
        _ => false,
    }
}

// ==========================================
// EntityKind - 实体类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Part,
    Operation,
    ProductionRecord,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Part => write!(f, "PART"),
            EntityKind::Operation => write!(f, "OPERATION"),
            EntityKind::ProductionRecord => write!(f, "PRODUCTION_RECORD"),
        }
    }
}

// ==========================================
// NaturalKey - 自然键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NaturalKey {
    Part { article_number: String },
    Operation { article_number: String, seq: i32 },
    Production(ProductionKey),
}

impl NaturalKey {
    pub fn part(article_number: impl Into<String>) -> Self {
        NaturalKey::Part {
            article_number: article_number.into(),
        }
    }

    pub fn operation(article_number: impl Into<String>, seq: i32) -> Self {
        NaturalKey::Operation {
            article_number: article_number.into(),
            seq,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            NaturalKey::Part { .. } => EntityKind::Part,
            NaturalKey::Operation { .. } => EntityKind::Operation,
            NaturalKey::Production(_) => EntityKind::ProductionRecord,
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Part { article_number } => write!(f, "{}", article_number),
            NaturalKey::Operation {
                article_number,
                seq,
            } => write!(f, "{}/{}", article_number, seq),
            NaturalKey::Production(key) => write!(f, "{}", key),
        }
    }
}

// ==========================================
// Entity - 可对账实体
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Entity {
    Part(Part),
    Operation(Operation),
    ProductionRecord(ProductionRecord),
}

impl Entity {
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Entity::Part(p) => NaturalKey::part(p.article_number.clone()),
            Entity::Operation(o) => NaturalKey::operation(o.article_number.clone(), o.seq),
            Entity::ProductionRecord(r) => NaturalKey::Production(r.key.clone()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.natural_key().kind()
    }

    /// 导入字段差异;类型不一致时视为全部变化
    ///
    /// 生产记录仅追加,不参与字段比较
    pub fn diff(&self, existing: &Entity) -> Vec<&'static str> {
        match (self, existing) {
            (Entity::Part(new), Entity::Part(old)) => new.diff(old),
            (Entity::Operation(new), Entity::Operation(old)) => new.diff(old),
            (Entity::ProductionRecord(_), Entity::ProductionRecord(_)) => Vec::new(),
            _ => vec!["*"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_float_eq() {
        assert!(float_eq(None, None));
        assert!(float_eq(Some(0.1 + 0.2), Some(0.3)));
        assert!(!float_eq(Some(1.0), None));
        assert!(!float_eq(Some(1.0), Some(1.1)));
    }

    #[test]
    fn test_natural_key_display() {
        assert_eq!(NaturalKey::part("D123").to_string(), "D123");
        assert_eq!(NaturalKey::operation("D123", 10).to_string(), "D123/10");

        let key = NaturalKey::Production(ProductionKey {
            job: "J100".to_string(),
            batch: "0".to_string(),
            article_number: "D123".to_string(),
            operation_seq: 10,
            date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        });
        assert_eq!(key.to_string(), "J100/0/D123/10/2024-03-05");
        assert_eq!(key.kind(), EntityKind::ProductionRecord);
    }
}
