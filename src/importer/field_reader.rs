// ==========================================
// ERP 导入连接器 - 远程行字段读取器
// ==========================================
// 职责: 远程字段 → 类型化值 (文本/数值/整数/日期)
// 约定: 空字符串与 null 视为缺失;类型错误 → Validation
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::remote::RemoteRow;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

pub struct FieldReader<'a> {
    row: &'a RemoteRow,
}

impl<'a> FieldReader<'a> {
    pub fn new(row: &'a RemoteRow) -> Self {
        Self { row }
    }

    /// 提取文本字段 (去除首尾空白);数值与布尔按字面量转文本
    pub fn text(&self, field: &str) -> Option<String> {
        match self.row.get(field)? {
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn require_text(&self, field: &str) -> ImportResult<String> {
        self.text(field)
            .ok_or_else(|| ImportError::missing_field(field))
    }

    /// 解析浮点数 (JSON 数值或数值字符串,容忍逗号小数点)
    pub fn number(&self, field: &str) -> ImportResult<Option<f64>> {
        match self.row.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| ImportError::validation(field, format!("无法解析为数值: {}", n))),
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                trimmed
                    .replace(',', ".")
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .map(Some)
                    .ok_or_else(|| {
                        ImportError::validation(field, format!("无法解析为数值: {}", trimmed))
                    })
            }
            Some(other) => Err(ImportError::validation(
                field,
                format!("无法解析为数值: {}", other),
            )),
        }
    }

    /// 解析整数 (允许 "10" / 10 / "10.0")
    pub fn integer(&self, field: &str) -> ImportResult<Option<i32>> {
        let value = match self.number(field)? {
            None => return Ok(None),
            Some(v) => v,
        };
        if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
            return Err(ImportError::validation(
                field,
                format!("无法解析为整数: {}", value),
            ));
        }
        Ok(Some(value as i32))
    }

    pub fn require_integer(&self, field: &str) -> ImportResult<i32> {
        self.integer(field)?
            .ok_or_else(|| ImportError::missing_field(field))
    }

    /// 解析日期
    ///
    /// 支持: YYYY-MM-DD, YYYYMMDD, "YYYYMMDD HH:MM:SS[.fff]", RFC 3339
    pub fn date(&self, field: &str) -> ImportResult<Option<NaiveDate>> {
        match self.text(field) {
            None => Ok(None),
            Some(value) => parse_date(&value)
                .map(Some)
                .ok_or_else(|| ImportError::validation(field, format!("日期格式错误: {}", value))),
        }
    }

    pub fn require_date(&self, field: &str) -> ImportResult<NaiveDate> {
        self.date(field)?
            .ok_or_else(|| ImportError::missing_field(field))
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y%m%d") {
        return Some(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%d %H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RemoteRow {
        RemoteRow::from_pairs([("F", value)])
    }

    #[test]
    fn test_text() {
        assert_eq!(FieldReader::new(&row(json!("  D123 "))).text("F"), Some("D123".into()));
        assert_eq!(FieldReader::new(&row(json!(""))).text("F"), None);
        assert_eq!(FieldReader::new(&row(json!(null))).text("F"), None);
        assert_eq!(FieldReader::new(&row(json!(42))).text("F"), Some("42".into()));
        assert!(FieldReader::new(&row(json!(null)))
            .require_text("F")
            .is_err());
    }

    #[test]
    fn test_number_formats() {
        assert_eq!(FieldReader::new(&row(json!(1.5))).number("F").unwrap(), Some(1.5));
        assert_eq!(FieldReader::new(&row(json!("2,25"))).number("F").unwrap(), Some(2.25));
        assert_eq!(FieldReader::new(&row(json!(" "))).number("F").unwrap(), None);
        assert!(matches!(
            FieldReader::new(&row(json!("abc"))).number("F"),
            Err(ImportError::Validation { .. })
        ));
    }

    #[test]
    fn test_integer() {
        assert_eq!(FieldReader::new(&row(json!("10"))).integer("F").unwrap(), Some(10));
        assert_eq!(FieldReader::new(&row(json!(20.0))).integer("F").unwrap(), Some(20));
        assert!(FieldReader::new(&row(json!("10.5"))).integer("F").is_err());
        assert!(FieldReader::new(&row(json!(null)))
            .require_integer("F")
            .is_err());
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        for raw in [
            "2024-03-05",
            "20240305",
            "20240305 00:00:00.000",
            "20240305 13:45:10",
            "2024-03-05T08:00:00Z",
            "2024-03-05T08:00:00",
        ] {
            assert_eq!(
                FieldReader::new(&row(json!(raw))).date("F").unwrap(),
                expected,
                "{}",
                raw
            );
        }
        assert!(FieldReader::new(&row(json!("05.03.2024"))).date("F").is_err());
    }
}
