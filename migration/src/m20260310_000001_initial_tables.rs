//! 初始表迁移
//!
//! 创建 short_links 表（含去范式化计数字段）和 click_events 表。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 short_links 表
        manager
            .create_table(
                Table::create()
                    .table(ShortLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ShortLinks::ShortCode)
                            .string_len(255)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ShortLinks::TargetUrl).text().not_null())
                    .col(
                        ColumnDef::new(ShortLinks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShortLinks::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ShortLinks::TotalClicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ShortLinks::UniqueVisitors)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        // 创建 click_events 表
        manager
            .create_table(
                Table::create()
                    .table(ClickEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::ShortCode)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::ClickedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::Referrer).text().null())
                    .col(ColumnDef::new(ClickEvents::IpHash).string_len(16).null())
                    .col(ColumnDef::new(ClickEvents::Country).string_len(100).null())
                    .col(ColumnDef::new(ClickEvents::Region).string_len(100).null())
                    .col(ColumnDef::new(ClickEvents::City).string_len(100).null())
                    .col(
                        ColumnDef::new(ClickEvents::BrowserName)
                            .string_len(100)
                            .null(),
                    )
                    .col(ColumnDef::new(ClickEvents::OsName).string_len(100).null())
                    .col(
                        ColumnDef::new(ClickEvents::DeviceCategory)
                            .string_len(50)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::BrowserFingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ClickEvents::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ShortLinks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ShortLinks {
    #[sea_orm(iden = "short_links")]
    Table,
    ShortCode,
    TargetUrl,
    CreatedAt,
    ExpiresAt,
    TotalClicks,
    UniqueVisitors,
}

#[derive(DeriveIden)]
enum ClickEvents {
    #[sea_orm(iden = "click_events")]
    Table,
    Id,
    ShortCode,
    ClickedAt,
    Referrer,
    IpHash,
    Country,
    Region,
    City,
    BrowserName,
    OsName,
    DeviceCategory,
    BrowserFingerprint,
}
