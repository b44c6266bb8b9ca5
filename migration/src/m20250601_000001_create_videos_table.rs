use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Videos::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Videos::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Videos::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Videos::Title).string().not_null())
                    .col(ColumnDef::new(Videos::Description).text().not_null())
                    .col(ColumnDef::new(Videos::VideoUrl).string().not_null())
                    .col(ColumnDef::new(Videos::ThumbnailUrl).string().not_null())
                    .col(ColumnDef::new(Videos::MimeType).string().not_null())
                    .col(ColumnDef::new(Videos::Duration).integer().not_null())
                    .col(
                        ColumnDef::new(Videos::Views)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Videos::IsPublished)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Videos::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Videos::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Catalog listings filter on publish state and sort by recency
        manager
            .create_index(
                Index::create()
                    .name("idx_videos_published_created_at")
                    .table(Videos::Table)
                    .col(Videos::IsPublished)
                    .col(Videos::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_videos_owner_id")
                    .table(Videos::Table)
                    .col(Videos::OwnerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Videos::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Videos {
    Table,
    Id,
    OwnerId,
    Title,
    Description,
    VideoUrl,
    ThumbnailUrl,
    MimeType,
    Duration,
    Views,
    IsPublished,
    CreatedAt,
    UpdatedAt,
}
