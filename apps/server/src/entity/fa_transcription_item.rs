//! A single structured row extracted from a diagram.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "fa_transcription_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub transcription_id: i32,
    pub sheet_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub message: Option<String>,
    pub start_ecu: Option<String>,
    pub end_ecu: Option<String>,
    pub sending_ecu: Option<String>,
    pub receiving_ecu: Option<String>,
    pub dashed_line: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fa_transcription::Entity",
        from = "Column::TranscriptionId",
        to = "super::fa_transcription::Column::Id",
        on_delete = "Cascade"
    )]
    Transcription,
}

impl Related<super::fa_transcription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transcription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
