// ==========================================
// ERP 导入连接器 - 物料主数据导入器
// ==========================================
// 远程对象: SLItems (默认)
// 自然键: article_number (Item)
// 依赖: 无,总是第一个运行
// ==========================================

use crate::config::StageSource;
use crate::domain::{Entity, EntityKind, ImportScope, NaturalKey, Part, StageKind};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_reader::FieldReader;
use crate::importer::reconcile::upsert;
use crate::importer::stage::{ImportStage, ReconcileOutcome, RowContext, RowDecision, StageTally};
use crate::remote::{CollectionQuery, FieldType, RemoteRow};
use crate::repository::EntityStore;
use async_trait::async_trait;

pub mod fields {
    pub const ITEM: &str = "Item";
    pub const DESCRIPTION: &str = "Description";
    pub const MATERIAL: &str = "UfMaterial";
    pub const UNIT_WEIGHT: &str = "UnitWeight";
}

const PROPERTIES: &[&str] = &[
    fields::ITEM,
    fields::DESCRIPTION,
    fields::MATERIAL,
    fields::UNIT_WEIGHT,
];

const REQUIRED_FIELDS: &[(&str, FieldType)] = &[
    (fields::ITEM, FieldType::Text),
    (fields::DESCRIPTION, FieldType::Text),
];

pub struct PartImporter {
    source: StageSource,
    page_size: u32,
    tally: StageTally,
}

impl PartImporter {
    pub fn new(source: StageSource, page_size: u32) -> Self {
        Self {
            source,
            page_size,
            tally: StageTally::new(StageKind::MasterData),
        }
    }

    fn try_transform(&self, row: &RemoteRow) -> ImportResult<RowDecision<Part>> {
        let reader = FieldReader::new(row);
        let article_number = reader.require_text(fields::ITEM)?;
        let name = reader.require_text(fields::DESCRIPTION)?;
        let weight = reader.number(fields::UNIT_WEIGHT)?;
        if let Some(w) = weight {
            if w < 0.0 {
                return Err(ImportError::validation(
                    fields::UNIT_WEIGHT,
                    format!("单重不能为负: {}", w),
                ));
            }
        }

        Ok(RowDecision::Accept {
            key: NaturalKey::part(article_number.clone()),
            candidate: Part {
                article_number,
                name,
                material: reader.text(fields::MATERIAL),
                weight,
            },
            warnings: Vec::new(),
        })
    }
}

#[async_trait]
impl ImportStage for PartImporter {
    type Candidate = Part;

    fn kind(&self) -> StageKind {
        StageKind::MasterData
    }

    fn entity_kind(&self) -> EntityKind {
        EntityKind::Part
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

    fn transform(&self, row: &RemoteRow, _ctx: &RowContext) -> RowDecision<Part> {
        self.try_transform(row).unwrap_or_else(RowDecision::Reject)
    }

    async fn reconcile(
        &self,
        candidate: Part,
        store: &dyn EntityStore,
    ) -> ImportResult<ReconcileOutcome> {
        upsert(store, Entity::Part(candidate)).await
    }

    fn tally(&self) -> &StageTally {
        &self.tally
    }
}
