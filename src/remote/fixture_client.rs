// ==========================================
// ERP 导入连接器 - 离线 JSON 远程客户端
// ==========================================
// 用途: 离线导入 (--fixture) 与测试替身
// 格式: {"objects": {"<对象名>": {"schema": [...], "rows": [...]}}}
// 分页: 数字游标 (行偏移量)
// 过滤: Field = 'v' / Field LIKE 'v%' ,以 AND 组合
// ==========================================

use crate::remote::client::{
    CollectionQuery, ObjectSchema, RemoteClient, RemotePage, RemoteRow, SchemaField,
};
use crate::remote::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

#[derive(Debug, Default, Deserialize)]
struct FixtureDocument {
    #[serde(default)]
    objects: HashMap<String, FixtureObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FixtureObject {
    #[serde(default)]
    schema: Vec<SchemaField>,
    #[serde(default)]
    rows: Vec<RemoteRow>,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq { field: String, value: String },
    Like { field: String, pattern: String },
}

// ==========================================
// FixtureRemote
// ==========================================
#[derive(Debug, Default)]
pub struct FixtureRemote {
    objects: HashMap<String, FixtureObject>,
    page_failures: Mutex<HashMap<String, VecDeque<RemoteError>>>,
    schema_failures: Mutex<HashMap<String, RemoteError>>,
    page_calls: AtomicUsize,
}

impl FixtureRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let doc: FixtureDocument = serde_json::from_str(raw)?;
        Ok(Self {
            objects: doc.objects,
            ..Self::default()
        })
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_json_str(&raw)?)
    }

    pub fn with_rows(mut self, object: &str, rows: Vec<RemoteRow>) -> Self {
        self.objects.entry(object.to_string()).or_default().rows = rows;
        self
    }

    pub fn with_schema(mut self, object: &str, fields: Vec<SchemaField>) -> Self {
        self.objects.entry(object.to_string()).or_default().schema = fields;
        self
    }

    /// 令后续 times 次 fetch_page 返回指定错误
    pub fn fail_next(&self, object: &str, error: RemoteError, times: usize) {
        if let Ok(mut failures) = self.page_failures.lock() {
            let queue = failures.entry(object.to_string()).or_default();
            queue.extend(std::iter::repeat(error).take(times));
        }
    }

    /// 令 describe_schema 持续返回指定错误
    pub fn fail_describe(&self, object: &str, error: RemoteError) {
        if let Ok(mut failures) = self.schema_failures.lock() {
            failures.insert(object.to_string(), error);
        }
    }

    /// fetch_page 累计调用次数
    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    fn take_page_failure(&self, object: &str) -> Option<RemoteError> {
        self.page_failures
            .lock()
            .ok()
            .and_then(|mut f| f.get_mut(object).and_then(|q| q.pop_front()))
    }

    /// 未声明 schema 时按行值推断字段类型
    fn infer_schema(rows: &[RemoteRow]) -> Vec<SchemaField> {
        let mut types: BTreeMap<String, Option<&'static str>> = BTreeMap::new();
        for row in rows {
            for (name, value) in row.fields() {
                let inferred = match value {
                    Value::Number(_) => Some("Decimal"),
                    Value::String(_) | Value::Bool(_) => Some("String"),
                    _ => None,
                };
                let slot = types.entry(name.clone()).or_insert(None);
                if slot.is_none() {
                    *slot = inferred;
                }
            }
        }
        types
            .into_iter()
            .map(|(name, data_type)| SchemaField {
                name,
                data_type: data_type.unwrap_or("String").to_string(),
                required: false,
            })
            .collect()
    }
}

fn condition_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\w+)\s*(=|LIKE)\s*'([^']*)'$").ok())
        .as_ref()
}

fn and_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+AND\s+").ok()).as_ref()
}

fn parse_filter(expr: &str) -> RemoteResult<Vec<Condition>> {
    let (and_re, condition_re) = match (and_regex(), condition_regex()) {
        (Some(a), Some(c)) => (a, c),
        _ => return Err(RemoteError::Protocol("过滤条件解析器初始化失败".to_string())),
    };
    and_re
        .split(expr)
        .map(|term| term.trim().trim_start_matches('(').trim_end_matches(')').trim())
        .filter(|term| !term.is_empty())
        .map(|term| {
            let caps = condition_re
                .captures(term)
                .ok_or_else(|| RemoteError::Protocol(format!("无法解析过滤条件: {}", term)))?;
            let field = caps[1].to_string();
            let value = caps[3].to_string();
            if caps[2].eq_ignore_ascii_case("LIKE") {
                Ok(Condition::Like {
                    field,
                    pattern: value,
                })
            } else {
                Ok(Condition::Eq { field, value })
            }
        })
        .collect()
}

fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn matches_all(row: &RemoteRow, conditions: &[Condition]) -> bool {
    conditions.iter().all(|c| match c {
        Condition::Eq { field, value } => value_text(row.get(field)).as_deref() == Some(value),
        Condition::Like { field, pattern } => {
            let text = value_text(row.get(field)).unwrap_or_default();
            match pattern.strip_suffix('%') {
                Some(prefix) => text.starts_with(prefix),
                None => text == *pattern,
            }
        }
    })
}

#[async_trait]
impl RemoteClient for FixtureRemote {
    async fn fetch_page(
        &self,
        query: &CollectionQuery,
        cursor: Option<&str>,
    ) -> RemoteResult<RemotePage> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.take_page_failure(&query.object) {
            return Err(error);
        }

        let object = self
            .objects
            .get(&query.object)
            .ok_or_else(|| RemoteError::Protocol(format!("远程对象不存在: {}", query.object)))?;

        let conditions = match query.filter.as_deref() {
            Some(expr) => parse_filter(expr)?,
            None => Vec::new(),
        };

        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| RemoteError::Protocol(format!("非法游标: {}", c)))?,
            None => 0,
        };
        let page_size = query.page_size.max(1) as usize;

        let matching: Vec<&RemoteRow> = object
            .rows
            .iter()
            .filter(|row| matches_all(row, &conditions))
            .collect();

        let rows: Vec<RemoteRow> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|row| (*row).clone())
            .collect();

        let next_offset = offset + rows.len();
        let next_cursor = if next_offset < matching.len() {
            Some(next_offset.to_string())
        } else {
            None
        };

        Ok(RemotePage { rows, next_cursor })
    }

    async fn describe_schema(&self, object: &str) -> RemoteResult<ObjectSchema> {
        if let Some(error) = self
            .schema_failures
            .lock()
            .ok()
            .and_then(|f| f.get(object).cloned())
        {
            return Err(error);
        }

        let fixture = self
            .objects
            .get(object)
            .ok_or_else(|| RemoteError::Protocol(format!("远程对象不存在: {}", object)))?;

        // 无行且未声明 schema: 结构无从推断,不做字段校验
        if !fixture.schema.is_empty() {
            Ok(ObjectSchema::new(object, fixture.schema.clone()))
        } else if fixture.rows.is_empty() {
            Ok(ObjectSchema::open(object))
        } else {
            Ok(ObjectSchema::new(object, Self::infer_schema(&fixture.rows)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::FieldType;
    use serde_json::json;

    fn routes() -> Vec<RemoteRow> {
        vec![
            RemoteRow::from_pairs([("Item", json!("D123")), ("Type", json!("S")), ("OperNum", json!(10))]),
            RemoteRow::from_pairs([("Item", json!("D124")), ("Type", json!("S")), ("OperNum", json!(10))]),
            RemoteRow::from_pairs([("Item", json!("X900")), ("Type", json!("J")), ("OperNum", json!(20))]),
        ]
    }

    #[test]
    fn test_parse_filter() {
        let conditions = parse_filter("(Type = 'S') AND (Item LIKE 'D%')").unwrap();
        assert_eq!(
            conditions,
            vec![
                Condition::Eq {
                    field: "Type".into(),
                    value: "S".into()
                },
                Condition::Like {
                    field: "Item".into(),
                    pattern: "D%".into()
                },
            ]
        );
        assert!(parse_filter("Item > 3").is_err());
    }

    #[tokio::test]
    async fn test_filter_applied_server_side() {
        let remote = FixtureRemote::new().with_rows("SLJobRoutes", routes());
        let mut query = CollectionQuery::new("SLJobRoutes", 10);
        query.filter = Some("Type = 'S'".to_string());

        let page = remote.fetch_page(&query, None).await.unwrap();
        assert_eq!(page.rows.len(), 2);
        assert!(page.next_cursor.is_none());

        query.filter = Some("OperNum = '20'".to_string());
        let page = remote.fetch_page(&query, None).await.unwrap();
        assert_eq!(page.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_schema_inferred_from_rows() {
        let remote = FixtureRemote::new().with_rows("SLJobRoutes", routes());
        let schema = remote.describe_schema("SLJobRoutes").await.unwrap();

        assert_eq!(schema.field("OperNum").map(|f| f.data_type.as_str()), Some("Decimal"));
        assert_eq!(schema.field("Item").map(|f| f.data_type.as_str()), Some("String"));
    }

    #[tokio::test]
    async fn test_empty_object_without_schema_is_open() {
        let remote = FixtureRemote::new().with_rows("SLJobTrans", Vec::new());
        let schema = remote.describe_schema("SLJobTrans").await.unwrap();
        assert!(schema.open);
        assert!(schema.check(&[("Job", FieldType::Text)]).is_empty());

        // 显式声明的 schema 仍然参与校验
        let declared = FixtureRemote::new().with_schema(
            "SLJobTrans",
            vec![SchemaField {
                name: "Item".to_string(),
                data_type: "String".to_string(),
                required: false,
            }],
        );
        let schema = declared.describe_schema("SLJobTrans").await.unwrap();
        assert!(!schema.open);
        assert_eq!(schema.check(&[("Job", FieldType::Text)]).len(), 1);
    }

    #[tokio::test]
    async fn test_from_json_document() {
        let remote = FixtureRemote::from_json_str(
            r#"{"objects": {"SLItems": {"rows": [{"Item": "D123", "Description": "Shaft"}]}}}"#,
        )
        .unwrap();

        let page = remote
            .fetch_page(&CollectionQuery::new("SLItems", 50), None)
            .await
            .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(remote.page_calls(), 1);
    }
}
