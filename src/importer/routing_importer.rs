// ==========================================
// ERP 导入连接器 - 工艺路线导入器
// ==========================================
// 远程对象: SLJobRoutes (默认过滤 Type = 'S')
// 自然键: (article_number, seq)
// 依赖: 所属物料必须已存在 → 否则 DependencyNotSatisfied (行失败)
// 规则优先级见 rules.rs
// ==========================================

use crate::config::StageSource;
use crate::domain::operation::COOPERATION_MANNING_PCT;
use crate::domain::{
    Entity, EntityKind, ImportScope, ImportWarning, NaturalKey, Operation, StageKind,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_reader::FieldReader;
use crate::importer::reconcile::{require_exists, upsert};
use crate::importer::rules::{RoutingClass, RoutingRules};
use crate::importer::stage::{ImportStage, ReconcileOutcome, RowContext, RowDecision, StageTally};
use crate::remote::{CollectionQuery, FieldType, RemoteRow};
use crate::repository::EntityStore;
use async_trait::async_trait;
use serde_json::Value;

pub mod fields {
    pub const ITEM: &str = "Item";
    pub const OPER_NUM: &str = "OperNum";
    pub const WC: &str = "Wc";
    pub const OPER_TYPE: &str = "OperType";
    pub const OBS_DATE: &str = "ObsDate";
    pub const RUN_HRS: &str = "RunHrs";
    pub const MANNING: &str = "Manning";
    pub const DESCRIPTION: &str = "Description";
}

const PROPERTIES: &[&str] = &[
    fields::ITEM,
    fields::OPER_NUM,
    fields::WC,
    fields::OPER_TYPE,
    fields::OBS_DATE,
    fields::RUN_HRS,
    fields::MANNING,
    fields::DESCRIPTION,
];

const REQUIRED_FIELDS: &[(&str, FieldType)] = &[
    (fields::ITEM, FieldType::Text),
    (fields::OPER_NUM, FieldType::Number),
    (fields::WC, FieldType::Text),
    (fields::OBS_DATE, FieldType::Date),
    (fields::RUN_HRS, FieldType::Number),
];

pub struct RoutingImporter {
    source: StageSource,
    page_size: u32,
    rules: RoutingRules,
    tally: StageTally,
}

impl RoutingImporter {
    pub fn new(source: StageSource, page_size: u32, rules: RoutingRules) -> Self {
        Self {
            source,
            page_size,
            rules,
            tally: StageTally::new(StageKind::Routing),
        }
    }

    fn try_transform(&self, row: &RemoteRow, ctx: &RowContext) -> ImportResult<RowDecision<Operation>> {
        let reader = FieldReader::new(row);
        let oper_type = reader.text(fields::OPER_TYPE);
        let wc = reader.text(fields::WC);
        // 只有日期/文本值才是停用标记,布尔等其它类型忽略
        let obsolete = matches!(
            row.get(fields::OBS_DATE),
            Some(Value::String(s)) if !s.trim().is_empty()
        );

        let class = self
            .rules
            .classify(&[oper_type.as_deref(), wc.as_deref()], obsolete);
        if let RoutingClass::Skip { reason } = class {
            return Ok(RowDecision::Skip { reason });
        }

        let article_number = reader.require_text(fields::ITEM)?;
        let seq = reader.require_integer(fields::OPER_NUM)?;

        // 工作中心解析: 缺失或未解析 → 空引用 + 警告
        let mut warnings = Vec::new();
        let work_center_id = match wc.as_deref() {
            Some(code) => {
                let id = ctx.codes.lookup(code).work_center_id();
                if id.is_none() {
                    warnings.push(ImportWarning::mapping_unresolved(code, fields::WC));
                }
                id
            }
            None => {
                warnings.push(ImportWarning::code_missing(fields::WC));
                None
            }
        };

        let (planned_time, manning_pct, is_cooperation) = match class {
            RoutingClass::Cooperation => (0.0, COOPERATION_MANNING_PCT, true),
            _ => {
                let planned_time = reader.number(fields::RUN_HRS)?.unwrap_or(0.0);
                if planned_time < 0.0 {
                    return Err(ImportError::validation(
                        fields::RUN_HRS,
                        format!("工时不能为负: {}", planned_time),
                    ));
                }
                let manning = reader
                    .number(fields::MANNING)?
                    .unwrap_or(COOPERATION_MANNING_PCT);
                if manning <= 0.0 {
                    return Err(ImportError::validation(
                        fields::MANNING,
                        format!("人员配置必须为正: {}", manning),
                    ));
                }
                (planned_time, manning, false)
            }
        };

        Ok(RowDecision::Accept {
            key: NaturalKey::operation(article_number.clone(), seq),
            candidate: Operation {
                article_number,
                seq,
                work_center_id,
                work_center_code: wc,
                planned_time,
                is_cooperation,
                manning_pct,
                description: reader.text(fields::DESCRIPTION),
            },
            warnings,
        })
    }
}

#[async_trait]
impl ImportStage for RoutingImporter {
    type Candidate = Operation;

    fn kind(&self) -> StageKind {
        StageKind::Routing
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::Operation
    }

    fn query(&self, scope: &ImportScope) -> CollectionQuery {
        CollectionQuery::new(self.source.object.clone(), self.page_size)
            .with_properties(PROPERTIES)
            .and_filter(self.source.filter.as_deref())
            .and_filter(scope.item_filter.as_deref())
    }

    fn required_fields(&self) -> &'static [(&'static str, FieldType)] {
        REQUIRED_FIELDS
    }

    fn codes_for_warmup(&self, row: &RemoteRow) -> Vec<String> {
        FieldReader::new(row).text(fields::WC).into_iter().collect()
    }

    fn transform(&self, row: &RemoteRow, ctx: &RowContext) -> RowDecision<Operation> {
        self.try_transform(row, ctx)
            .unwrap_or_else(RowDecision::Reject)
    }

    async fn reconcile(
        &self,
        candidate: Operation,
        store: &dyn EntityStore,
    ) -> ImportResult<ReconcileOutcome> {
        require_exists(store, &NaturalKey::part(candidate.article_number.clone())).await?;
        upsert(store, Entity::Operation(candidate)).await
    }

    fn tally(&self) -> &StageTally {
        &self.tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RoutingRuleSettings, StageSources};
    use crate::domain::CodeMappingEntry;
    use crate::resolver::CodeResolver;
    use serde_json::json;

    fn importer() -> RoutingImporter {
        RoutingImporter::new(
            StageSources::default().routing,
            100,
            RoutingRules::from_settings(&RoutingRuleSettings::default()).unwrap(),
        )
    }

    fn ctx(codes: &[&str]) -> RowContext {
        let resolver = CodeResolver::from_entries([
            CodeMappingEntry::prefix("KOO", 80000016),
            CodeMappingEntry::exact("M01", 80000001),
        ]);
        RowContext {
            row_number: 1,
            codes: resolver.warmup(codes.iter().copied()),
        }
    }

    fn row(item: &str, seq: i64, wc: &str, obs: Value) -> RemoteRow {
        RemoteRow::from_pairs([
            ("Item", json!(item)),
            ("OperNum", json!(seq)),
            ("Wc", json!(wc)),
            ("ObsDate", obs),
            ("RunHrs", json!(0.75)),
            ("Manning", json!(50)),
        ])
    }

    #[test]
    fn test_cooperation_row() {
        let decision = importer().transform(&row("D123", 10, "KOO1", Value::Null), &ctx(&["KOO1"]));
        match decision {
            RowDecision::Accept {
                key,
                candidate,
                warnings,
            } => {
                assert_eq!(key, NaturalKey::operation("D123", 10));
                assert_eq!(candidate.work_center_id, Some(80000016));
                assert!(candidate.is_cooperation);
                assert_eq!(candidate.planned_time, 0.0);
                assert_eq!(candidate.manning_pct, 100.0);
                assert!(warnings.is_empty());
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_standard_row_keeps_times() {
        match importer().transform(&row("D123", 20, "M01", Value::Null), &ctx(&["M01"])) {
            RowDecision::Accept { candidate, .. } => {
                assert!(!candidate.is_cooperation);
                assert_eq!(candidate.planned_time, 0.75);
                assert_eq!(candidate.manning_pct, 50.0);
                assert_eq!(candidate.work_center_id, Some(80000001));
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_obsolete_row_skipped() {
        assert!(matches!(
            importer().transform(&row("D123", 30, "M01", json!("2023-01-01")), &ctx(&[])),
            RowDecision::Skip { .. }
        ));
    }

    #[test]
    fn test_skip_pattern_row_skipped() {
        assert!(matches!(
            importer().transform(&row("D123", 40, "UEB01", Value::Null), &ctx(&[])),
            RowDecision::Skip { .. }
        ));
    }

    #[test]
    fn test_unresolved_code_warns() {
        match importer().transform(&row("D123", 50, "XY9", Value::Null), &ctx(&["XY9"])) {
            RowDecision::Accept {
                candidate,
                warnings,
                ..
            } => {
                assert_eq!(candidate.work_center_id, None);
                assert_eq!(candidate.work_center_code.as_deref(), Some("XY9"));
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_boolean_obsolete_marker_ignored() {
        assert!(matches!(
            importer().transform(&row("D123", 30, "M01", json!(false)), &ctx(&["M01"])),
            RowDecision::Accept { .. }
        ));
    }

    #[test]
    fn test_cooperation_without_wc_gets_null_reference() {
        let r = RemoteRow::from_pairs([
            ("Item", json!("D123")),
            ("OperNum", json!(60)),
            ("OperType", json!("KOOP")),
        ]);
        match importer().transform(&r, &ctx(&[])) {
            RowDecision::Accept {
                candidate,
                warnings,
                ..
            } => {
                assert!(candidate.is_cooperation);
                assert_eq!(candidate.work_center_id, None);
                assert_eq!(candidate.work_center_code, None);
                assert_eq!(warnings.len(), 1);
                assert_eq!(warnings[0].kind, crate::domain::WarningKind::MappingUnresolved);
                assert!(warnings[0].code.is_none());
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_bad_sequence_rejected() {
        let r = RemoteRow::from_pairs([
            ("Item", json!("D123")),
            ("OperNum", json!("ten")),
            ("Wc", json!("M01")),
        ]);
        assert!(matches!(
            importer().transform(&r, &ctx(&[])),
            RowDecision::Reject(ImportError::Validation { .. })
        ));
    }
}
