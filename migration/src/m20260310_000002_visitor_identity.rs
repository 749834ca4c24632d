//! 访客身份表迁移
//!
//! 创建 device_profiles 表（每个浏览器指纹在单个链接上的信号档案）
//! 和 fingerprint_correlations 表（浏览器指纹 → 设备簇归属）。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 device_profiles 表
        manager
            .create_table(
                Table::create()
                    .table(DeviceProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceProfiles::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::ShortCode)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::BrowserFingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::DeviceFingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::Enhanced)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::NetHash)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::OsFamily)
                            .string_len(50)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::Timezone)
                            .string_len(100)
                            .null(),
                    )
                    .col(ColumnDef::new(DeviceProfiles::Screen).string_len(50).null())
                    .col(
                        ColumnDef::new(DeviceProfiles::HardwareConcurrency)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::CanvasSignature)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::WebglSignature)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::AudioSignature)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::FontsHash)
                            .string_len(16)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::StorageFlags)
                            .string_len(8)
                            .null(),
                    )
                    .col(ColumnDef::new(DeviceProfiles::ProbeJson).text().null())
                    .col(
                        ColumnDef::new(DeviceProfiles::FirstSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::LastSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceProfiles::VisitCount)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        // (short_code, browser_fingerprint) 唯一索引：upsert 冲突目标
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_device_profiles_code_fp")
                    .table(DeviceProfiles::Table)
                    .col(DeviceProfiles::ShortCode)
                    .col(DeviceProfiles::BrowserFingerprint)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 设备指纹匹配查询用索引
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_device_profiles_code_device")
                    .table(DeviceProfiles::Table)
                    .col(DeviceProfiles::ShortCode)
                    .col(DeviceProfiles::DeviceFingerprint)
                    .to_owned(),
            )
            .await?;

        // 创建 fingerprint_correlations 表
        manager
            .create_table(
                Table::create()
                    .table(FingerprintCorrelations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FingerprintCorrelations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FingerprintCorrelations::ShortCode)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FingerprintCorrelations::BrowserFingerprint)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FingerprintCorrelations::DeviceClusterId)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FingerprintCorrelations::Method)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FingerprintCorrelations::Confidence)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FingerprintCorrelations::FirstCorrelated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FingerprintCorrelations::LastConfirmed)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 每个浏览器指纹在单个链接上只归属一个簇
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_fp_correlations_code_fp")
                    .table(FingerprintCorrelations::Table)
                    .col(FingerprintCorrelations::ShortCode)
                    .col(FingerprintCorrelations::BrowserFingerprint)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 簇成员查询、合并改写用索引
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_fp_correlations_code_cluster")
                    .table(FingerprintCorrelations::Table)
                    .col(FingerprintCorrelations::ShortCode)
                    .col(FingerprintCorrelations::DeviceClusterId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_fp_correlations_code_cluster")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("uq_fp_correlations_code_fp").to_owned())
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(FingerprintCorrelations::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_device_profiles_code_device")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("uq_device_profiles_code_fp").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(DeviceProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeviceProfiles {
    #[sea_orm(iden = "device_profiles")]
    Table,
    Id,
    ShortCode,
    BrowserFingerprint,
    DeviceFingerprint,
    Enhanced,
    NetHash,
    OsFamily,
    Timezone,
    Screen,
    HardwareConcurrency,
    CanvasSignature,
    WebglSignature,
    AudioSignature,
    FontsHash,
    StorageFlags,
    ProbeJson,
    FirstSeen,
    LastSeen,
    VisitCount,
}

#[derive(DeriveIden)]
enum FingerprintCorrelations {
    #[sea_orm(iden = "fingerprint_correlations")]
    Table,
    Id,
    ShortCode,
    BrowserFingerprint,
    DeviceClusterId,
    Method,
    Confidence,
    FirstCorrelated,
    LastConfirmed,
}
