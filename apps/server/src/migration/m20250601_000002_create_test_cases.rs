//! Create test_cases and test_results tables.

use sea_orm_migration::prelude::*;

use super::m20250601_000001_create_scripts::Script;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TestCase::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TestCase::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TestCase::ScriptId).integer().not_null())
                    .col(ColumnDef::new(TestCase::Title).string_len(100).not_null())
                    .col(ColumnDef::new(TestCase::Content).text().not_null())
                    .col(
                        ColumnDef::new(TestCase::Language)
                            .string_len(50)
                            .not_null()
                            .default("python"),
                    )
                    .col(ColumnDef::new(TestCase::Requirements).text())
                    .col(
                        ColumnDef::new(TestCase::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TestCase::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(TestCase::Table, TestCase::ScriptId)
                            .to(Script::Table, Script::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TestResult::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TestResult::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TestResult::TestCaseId).integer().not_null())
                    .col(ColumnDef::new(TestResult::Status).string_len(20).not_null())
                    .col(ColumnDef::new(TestResult::Output).text())
                    .col(ColumnDef::new(TestResult::ExecutionTime).double())
                    .col(
                        ColumnDef::new(TestResult::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(TestResult::Table, TestResult::TestCaseId)
                            .to(TestCase::Table, TestCase::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_test_cases_script_id")
                    .table(TestCase::Table)
                    .col(TestCase::ScriptId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_test_results_test_case_id")
                    .table(TestResult::Table)
                    .col(TestResult::TestCaseId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TestResult::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TestCase::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TestCase {
    #[sea_orm(iden = "test_cases")]
    Table,
    Id,
    ScriptId,
    Title,
    Content,
    Language,
    Requirements,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum TestResult {
    #[sea_orm(iden = "test_results")]
    Table,
    Id,
    TestCaseId,
    Status,
    Output,
    ExecutionTime,
    CreatedAt,
}
