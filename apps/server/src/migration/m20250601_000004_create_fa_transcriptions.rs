//! Create images, fa_transcriptions and fa_transcription_items tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Image::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Image::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Image::Filename).string_len(255).not_null())
                    .col(ColumnDef::new(Image::Data).blob().not_null())
                    .col(ColumnDef::new(Image::ContentType).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Image::UploadedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FaTranscription::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FaTranscription::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FaTranscription::ImageId).integer().not_null())
                    .col(
                        ColumnDef::new(FaTranscription::ProcessedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(FaTranscription::Table, FaTranscription::ImageId)
                            .to(Image::Table, Image::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FaTranscriptionItem::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FaTranscriptionItem::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FaTranscriptionItem::TranscriptionId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FaTranscriptionItem::SheetName).string_len(255))
                    .col(ColumnDef::new(FaTranscriptionItem::Message).text())
                    .col(ColumnDef::new(FaTranscriptionItem::StartEcu).string_len(255))
                    .col(ColumnDef::new(FaTranscriptionItem::EndEcu).string_len(255))
                    .col(ColumnDef::new(FaTranscriptionItem::SendingEcu).string_len(255))
                    .col(ColumnDef::new(FaTranscriptionItem::ReceivingEcu).string_len(255))
                    .col(ColumnDef::new(FaTranscriptionItem::DashedLine).string_len(255))
                    .col(
                        ColumnDef::new(FaTranscriptionItem::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(
                                FaTranscriptionItem::Table,
                                FaTranscriptionItem::TranscriptionId,
                            )
                            .to(FaTranscription::Table, FaTranscription::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fa_transcription_items_transcription_id")
                    .table(FaTranscriptionItem::Table)
                    .col(FaTranscriptionItem::TranscriptionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FaTranscriptionItem::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FaTranscription::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Image::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Image {
    #[sea_orm(iden = "images")]
    Table,
    Id,
    Filename,
    Data,
    ContentType,
    UploadedAt,
}

#[derive(DeriveIden)]
enum FaTranscription {
    #[sea_orm(iden = "fa_transcriptions")]
    Table,
    Id,
    ImageId,
    ProcessedAt,
}

#[derive(DeriveIden)]
enum FaTranscriptionItem {
    #[sea_orm(iden = "fa_transcription_items")]
    Table,
    Id,
    TranscriptionId,
    SheetName,
    Message,
    StartEcu,
    EndEcu,
    SendingEcu,
    ReceivingEcu,
    DashedLine,
    CreatedAt,
}
