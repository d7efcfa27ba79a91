// ==========================================
// ERP 导入连接器 - 远程客户端 Trait
// ==========================================
// 职责: 定义远程数据对象 (IDO) 访问接口（不包含实现）
// 实现者: IdoClient (HTTP), FixtureRemote (JSON 离线), Retrying<C> (重试装饰器)
// ==========================================

use crate::remote::error::RemoteResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

// ==========================================
// RemoteRow - 远程原始行
// ==========================================
// 生命周期: 仅在导入流程内 (拉取 → 转换)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRow(Map<String, Value>);

impl RemoteRow {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// 由 (字段, 值) 列表构造,便于离线数据与测试
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

// ==========================================
// 查询与分页
// ==========================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    pub object: String,          // 远程对象名
    pub properties: Vec<String>, // 需返回的字段
    pub filter: Option<String>,  // 服务端过滤表达式
    pub page_size: u32,
}

impl CollectionQuery {
    pub fn new(object: impl Into<String>, page_size: u32) -> Self {
        Self {
            object: object.into(),
            properties: Vec::new(),
            filter: None,
            page_size,
        }
    }

    pub fn with_properties(mut self, properties: &[&str]) -> Self {
        self.properties = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    /// 追加过滤条件 (AND 组合)
    pub fn and_filter(mut self, extra: Option<&str>) -> Self {
        let extra = extra.map(str::trim).filter(|f| !f.is_empty());
        self.filter = match (self.filter.take(), extra) {
            (Some(base), Some(extra)) => Some(format!("({}) AND ({})", base, extra)),
            (Some(base), None) => Some(base),
            (None, Some(extra)) => Some(extra.to_string()),
            (None, None) => None,
        };
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemotePage {
    pub rows: Vec<RemoteRow>,
    pub next_cursor: Option<String>, // None 表示最后一页
}

// ==========================================
// 对象结构描述
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Number,
    Date,
    Other,
}

impl FieldType {
    /// 解析远程 DataType 描述
    pub fn from_remote(data_type: &str) -> Self {
        match data_type.trim().to_ascii_lowercase().as_str() {
            "string" | "text" | "char" | "varchar" => FieldType::Text,
            "decimal" | "integer" | "int" | "long" | "short" | "byte" | "float" | "double"
            | "number" | "numeric" => FieldType::Number,
            "date" | "datetime" | "timestamp" => FieldType::Date,
            _ => FieldType::Other,
        }
    }

    /// 远程类型能否安全转换为期望类型
    pub fn accepts(&self, remote: FieldType) -> bool {
        match self {
            FieldType::Text | FieldType::Other => true,
            FieldType::Number => matches!(remote, FieldType::Number | FieldType::Other),
            FieldType::Date => matches!(remote, FieldType::Date | FieldType::Text | FieldType::Other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub object: String,
    pub fields: Vec<SchemaField>,
    /// 结构未知 (离线数据无行且未声明字段),跳过字段校验
    #[serde(default)]
    pub open: bool,
}

impl ObjectSchema {
    pub fn new(object: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        Self {
            object: object.into(),
            fields,
            open: false,
        }
    }

    pub fn open(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            fields: Vec::new(),
            open: true,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// 校验期望字段是否存在且类型兼容,返回全部偏差描述
    pub fn check(&self, expected: &[(&str, FieldType)]) -> Vec<String> {
        if self.open {
            return Vec::new();
        }
        expected
            .iter()
            .filter_map(|(name, want)| match self.field(name) {
                None => Some(format!("缺少字段 {}", name)),
                Some(field) => {
                    let got = FieldType::from_remote(&field.data_type);
                    if want.accepts(got) {
                        None
                    } else {
                        Some(format!(
                            "字段 {} 类型为 {}, 期望 {:?}",
                            name, field.data_type, want
                        ))
                    }
                }
            })
            .collect()
    }
}

// ==========================================
// RemoteClient Trait
// ==========================================
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// 拉取一页数据
    ///
    /// # 参数
    /// - query: 查询条件 (对象名/字段/过滤/页大小)
    /// - cursor: 续页标记,None 表示第一页
    ///
    /// # 返回
    /// - Ok(RemotePage): 本页行 + 续页标记
    /// - Err(Connectivity): 瞬时失败,可重试
    /// - Err(Auth): 凭据被拒绝,运行级致命
    async fn fetch_page(
        &self,
        query: &CollectionQuery,
        cursor: Option<&str>,
    ) -> RemoteResult<RemotePage>;

    /// 描述远程对象结构,用于转换前的结构漂移检查
    async fn describe_schema(&self, object: &str) -> RemoteResult<ObjectSchema>;
}

// 共享句柄直接转发,便于 Retrying<Arc<dyn RemoteClient>> 组合
#[async_trait]
impl<T: RemoteClient + ?Sized> RemoteClient for Arc<T> {
    async fn fetch_page(
        &self,
        query: &CollectionQuery,
        cursor: Option<&str>,
    ) -> RemoteResult<RemotePage> {
        (**self).fetch_page(query, cursor).await
    }

    async fn describe_schema(&self, object: &str) -> RemoteResult<ObjectSchema> {
        (**self).describe_schema(object).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_filter_combination() {
        let q = CollectionQuery::new("SLJobRoutes", 100);
        assert_eq!(q.clone().and_filter(None).filter, None);
        assert_eq!(
            q.clone().and_filter(Some(" Item LIKE 'D%' ")).filter.as_deref(),
            Some("Item LIKE 'D%'")
        );

        let mut typed = q;
        typed.filter = Some("Type = 'S'".to_string());
        assert_eq!(
            typed.and_filter(Some("Item = 'D123'")).filter.as_deref(),
            Some("(Type = 'S') AND (Item = 'D123')")
        );
    }

    #[test]
    fn test_schema_check_reports_missing_and_incompatible() {
        let schema = ObjectSchema::new(
            "SLItems",
            vec![
                SchemaField {
                    name: "Item".to_string(),
                    data_type: "String".to_string(),
                    required: true,
                },
                SchemaField {
                    name: "UnitWeight".to_string(),
                    data_type: "String".to_string(),
                    required: false,
                },
            ],
        );

        let issues = schema.check(&[
            ("Item", FieldType::Text),
            ("UnitWeight", FieldType::Number),
            ("Description", FieldType::Text),
        ]);

        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("UnitWeight"));
        assert!(issues[1].contains("Description"));
    }

    #[test]
    fn test_open_schema_accepts_any_expectation() {
        let schema = ObjectSchema::open("SLJobTrans");
        assert!(schema.check(&[("Job", FieldType::Text)]).is_empty());
        assert!(!ObjectSchema::new("SLJobTrans", Vec::new())
            .check(&[("Job", FieldType::Text)])
            .is_empty());
    }

    #[test]
    fn test_field_type_from_remote() {
        assert_eq!(FieldType::from_remote("Decimal"), FieldType::Number);
        assert_eq!(FieldType::from_remote("DateTime"), FieldType::Date);
        assert_eq!(FieldType::from_remote("String"), FieldType::Text);
        assert_eq!(FieldType::from_remote("Binary"), FieldType::Other);
    }
}
