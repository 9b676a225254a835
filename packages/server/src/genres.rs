use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr, TransactionSession, TransactionTrait,
};
use uuid::Uuid;

use crate::entity::{genre, spec_genre};

/// Look up a genre by exact name, creating it if absent.
pub async fn find_or_create<C>(conn: &C, name: &str) -> Result<genre::Model, DbErr>
where
    C: ConnectionTrait + TransactionTrait,
{
    if let Some(existing) = find_by_name(conn, name).await? {
        return Ok(existing);
    }
    insert_or_find(conn, name).await
}

/// Insert `name` under a savepoint. A concurrent insert of the same name
/// rolls the savepoint back and the existing row is returned, leaving an
/// enclosing transaction usable.
async fn insert_or_find<C>(conn: &C, name: &str) -> Result<genre::Model, DbErr>
where
    C: ConnectionTrait + TransactionTrait,
{
    let savepoint = conn.begin().await?;
    let model = genre::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    };

    match model.insert(&savepoint).await {
        Ok(inserted) => {
            savepoint.commit().await?;
            Ok(inserted)
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            savepoint.rollback().await?;
            find_by_name(conn, name).await?.ok_or_else(|| {
                DbErr::Custom("UniqueConstraintViolation but existing genre not found".to_string())
            })
        }
        Err(e) => Err(e),
    }
}

async fn find_by_name<C: ConnectionTrait>(conn: &C, name: &str) -> Result<Option<genre::Model>, DbErr> {
    genre::Entity::find()
        .filter(genre::Column::Name.eq(name))
        .one(conn)
        .await
}

/// Replace the genre links of a Spec with `names`. Returns the linked names in input order.
pub async fn relink<C>(conn: &C, spec_id: Uuid, names: &[String]) -> Result<Vec<String>, DbErr>
where
    C: ConnectionTrait + TransactionTrait,
{
    unlink_all(conn, spec_id).await?;

    let mut linked = Vec::with_capacity(names.len());
    for name in names {
        let genre = find_or_create(conn, name).await?;
        spec_genre::ActiveModel {
            spec_id: Set(spec_id),
            genre_id: Set(genre.id),
        }
        .insert(conn)
        .await?;
        linked.push(genre.name);
    }
    Ok(linked)
}

pub async fn unlink_all<C: ConnectionTrait>(conn: &C, spec_id: Uuid) -> Result<u64, DbErr> {
    let result = spec_genre::Entity::delete_many()
        .filter(spec_genre::Column::SpecId.eq(spec_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

/// Genre names linked to a Spec, sorted by name.
pub async fn names_for<C: ConnectionTrait>(conn: &C, spec_id: Uuid) -> Result<Vec<String>, DbErr> {
    let genre_ids: Vec<i32> = spec_genre::Entity::find()
        .filter(spec_genre::Column::SpecId.eq(spec_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|link| link.genre_id)
        .collect();

    if genre_ids.is_empty() {
        return Ok(Vec::new());
    }

    Ok(genre::Entity::find()
        .filter(genre::Column::Id.is_in(genre_ids))
        .order_by_asc(genre::Column::Name)
        .all(conn)
        .await?
        .into_iter()
        .map(|g| g.name)
        .collect())
}
