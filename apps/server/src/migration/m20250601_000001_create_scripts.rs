//! Create scripts and script_versions tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Script::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Script::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Script::Title).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Script::Language)
                            .string_len(50)
                            .not_null()
                            .default("python"),
                    )
                    .col(ColumnDef::new(Script::Content).text().not_null())
                    .col(
                        ColumnDef::new(Script::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Script::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ScriptVersion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScriptVersion::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScriptVersion::ScriptId).integer().not_null())
                    .col(ColumnDef::new(ScriptVersion::Version).integer().not_null())
                    .col(ColumnDef::new(ScriptVersion::Content).text().not_null())
                    .col(ColumnDef::new(ScriptVersion::Changes).text())
                    .col(
                        ColumnDef::new(ScriptVersion::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ScriptVersion::Table, ScriptVersion::ScriptId)
                            .to(Script::Table, Script::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Version numbers are never reused within a script
        manager
            .create_index(
                Index::create()
                    .name("idx_script_versions_script_version")
                    .table(ScriptVersion::Table)
                    .col(ScriptVersion::ScriptId)
                    .col(ScriptVersion::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scripts_updated_at")
                    .table(Script::Table)
                    .col(Script::UpdatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScriptVersion::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Script::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Script {
    #[sea_orm(iden = "scripts")]
    Table,
    Id,
    Title,
    Language,
    Content,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ScriptVersion {
    #[sea_orm(iden = "script_versions")]
    Table,
    Id,
    ScriptId,
    Version,
    Content,
    Changes,
    CreatedAt,
}
