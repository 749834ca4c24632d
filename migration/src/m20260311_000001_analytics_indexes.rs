//! click_events 查询索引迁移
//!
//! 单链接时间序列查询和时间范围扫描的覆盖索引。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // short_code 索引（用于单链接查询与重置）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_short_code")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::ShortCode)
                    .to_owned(),
            )
            .await?;

        // clicked_at 索引（用于时间范围查询）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_clicked_at")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        // 复合索引（用于单链接时间序列查询）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_click_events_code_time")
                    .table(ClickEvents::Table)
                    .col(ClickEvents::ShortCode)
                    .col(ClickEvents::ClickedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_click_events_code_time").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_click_events_clicked_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_click_events_short_code")
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum ClickEvents {
    #[sea_orm(iden = "click_events")]
    Table,
    ShortCode,
    ClickedAt,
}
