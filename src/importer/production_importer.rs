// ==========================================
// ERP 导入连接器 - 生产执行记录导入器
// ==========================================
// 远程对象: SLJobTrans (默认过滤 TransType = 'R')
// 自然键: (job, batch, article_number, operation_seq, date)
// 红线: 仅追加;完整自然键已存在 → 视为已导入,记为跳过
// 依赖: 物料必须存在;production.require_operation 开启时工序也必须存在
// ==========================================

use crate::config::StageSource;
use crate::domain::{
    Entity, EntityKind, ImportScope, ImportWarning, NaturalKey, ProductionKey, ProductionRecord,
    StageKind,
};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_reader::FieldReader;
use crate::importer::reconcile::{insert_if_absent, require_exists};
use crate::importer::stage::{ImportStage, ReconcileOutcome, RowContext, RowDecision, StageTally};
use crate::remote::{CollectionQuery, FieldType, RemoteRow};
use crate::repository::EntityStore;
use async_trait::async_trait;

pub mod fields {
    pub const JOB: &str = "Job";
    pub const SUFFIX: &str = "Suffix";
    pub const ITEM: &str = "Item";
    pub const OPER_NUM: &str = "OperNum";
    pub const ACTUAL_HRS: &str = "AHrs";
    pub const WC: &str = "Wc";
    pub const TRANS_DATE: &str = "TransDate";
}

/// 订单后缀缺失时的批次号
const DEFAULT_BATCH: &str = "0";

const PROPERTIES: &[&str] = &[
    fields::JOB,
    fields::SUFFIX,
    fields::ITEM,
    fields::OPER_NUM,
    fields::ACTUAL_HRS,
    fields::WC,
    fields::TRANS_DATE,
];

const REQUIRED_FIELDS: &[(&str, FieldType)] = &[
    (fields::JOB, FieldType::Text),
    (fields::ITEM, FieldType::Text),
    (fields::OPER_NUM, FieldType::Number),
    (fields::ACTUAL_HRS, FieldType::Number),
    (fields::TRANS_DATE, FieldType::Date),
];

pub struct ProductionImporter {
    source: StageSource,
    page_size: u32,
    require_operation: bool,
    tally: StageTally,
}

impl ProductionImporter {
    pub fn new(source: StageSource, page_size: u32, require_operation: bool) -> Self {
        Self {
            source,
            page_size,
            require_operation,
            tally: StageTally::new(StageKind::Production),
        }
    }

    fn try_transform(
        &self,
        row: &RemoteRow,
        ctx: &RowContext,
    ) -> ImportResult<RowDecision<ProductionRecord>> {
        let reader = FieldReader::new(row);
        let key = ProductionKey {
            job: reader.require_text(fields::JOB)?,
            batch: reader
                .text(fields::SUFFIX)
                .unwrap_or_else(|| DEFAULT_BATCH.to_string()),
            article_number: reader.require_text(fields::ITEM)?,
            operation_seq: reader.require_integer(fields::OPER_NUM)?,
            date: reader.require_date(fields::TRANS_DATE)?,
        };
        let actual_time = reader
            .number(fields::ACTUAL_HRS)?
            .ok_or_else(|| ImportError::missing_field(fields::ACTUAL_HRS))?;

        let mut warnings = Vec::new();
        let machine_code = reader.text(fields::WC);
        let work_center_id = match &machine_code {
            Some(code) => {
                let id = ctx.codes.lookup(code).work_center_id();
                if id.is_none() {
                    warnings.push(ImportWarning::mapping_unresolved(code, fields::WC));
                }
                id
            }
            None => None,
        };

        Ok(RowDecision::Accept {
            key: NaturalKey::Production(key.clone()),
            candidate: ProductionRecord {
                key,
                actual_time,
                machine_code,
                work_center_id,
            },
            warnings,
        })
    }
}

#[async_trait]
impl ImportStage for ProductionImporter {
    type Candidate = ProductionRecord;

    fn kind(&self) -> StageKind {
        StageKind::Production
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::ProductionRecord
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

    fn transform(&self, row: &RemoteRow, ctx: &RowContext) -> RowDecision<ProductionRecord> {
        self.try_transform(row, ctx)
            .unwrap_or_else(RowDecision::Reject)
    }

    async fn reconcile(
        &self,
        candidate: ProductionRecord,
        store: &dyn EntityStore,
    ) -> ImportResult<ReconcileOutcome> {
        let article = &candidate.key.article_number;
        require_exists(store, &NaturalKey::part(article.clone())).await?;
        if self.require_operation {
            require_exists(
                store,
                &NaturalKey::operation(article.clone(), candidate.key.operation_seq),
            )
            .await?;
        }
        insert_if_absent(store, Entity::ProductionRecord(candidate)).await
    }

    fn tally(&self) -> &StageTally {
        &self.tally
    }
}
