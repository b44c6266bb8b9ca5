use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Comments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Comments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Comments::VideoId).uuid().not_null())
                    .col(ColumnDef::new(Comments::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Comments::Content).text().not_null())
                    .col(ColumnDef::new(Comments::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // Comment listing and the delete cascade both look up by video
        manager
            .create_index(
                Index::create()
                    .name("idx_comments_video_id")
                    .table(Comments::Table)
                    .col(Comments::VideoId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Comments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Comments {
    Table,
    Id,
    VideoId,
    OwnerId,
    Content,
    CreatedAt,
}
