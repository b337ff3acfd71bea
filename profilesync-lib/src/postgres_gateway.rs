//! [`PersistenceGateway`] over PostgreSQL.
//!
//! Statements are built with sea-query and bound through
//! sea-query-postgres. The table layout is `sql/schema.sql`; table names
//! come from [`TableNames`].

use async_trait::async_trait;
use bb8::{PooledConnection, RunError};
use bb8_postgres::PostgresConnectionManager;
use chrono::{DateTime, Utc};
use sea_query::{Alias, Expr, InsertStatement, OnConflict, Order, PostgresQueryBuilder, Query, SimpleExpr};
use sea_query_postgres::PostgresBinder;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

use crate::config::TableNames;
use crate::db_connection::PgPool;
use crate::error::{SyncError, Target, ValidationFault};
use crate::gateway::PersistenceGateway;
use crate::model::{
    Collection, OwnerId, ProfileFields, ProfileFieldsPatch, SectionVisibility, WalletDetails,
};
use crate::records::{CollectionRows, GoalRecord, Loaded, SocialLinkRecord, WalletMethodRecord};

const PROFILE_COLUMNS: [&str; 9] = [
    "display_name",
    "bio",
    "avatar_url",
    "banner_url",
    "location",
    "theme_id",
    "show_wallet",
    "show_socials",
    "show_goals",
];

const WALLET_METHOD_COLUMNS: [&str; 12] = [
    "id",
    "profile_id",
    "method_type",
    "platform",
    "name",
    "handle",
    "url",
    "details",
    "enabled",
    "order_index",
    "created_at",
    "updated_at",
];

const SOCIAL_LINK_COLUMNS: [&str; 11] = [
    "id",
    "profile_id",
    "platform",
    "username",
    "url",
    "photo_url",
    "photo_caption",
    "wallet_method_id",
    "order_index",
    "created_at",
    "updated_at",
];

const GOAL_COLUMNS: [&str; 11] = [
    "id",
    "profile_id",
    "title",
    "description",
    "target_amount",
    "current_amount",
    "wallet_method_id",
    "active",
    "order_index",
    "created_at",
    "updated_at",
];

/// Columns an upsert never overwrites
const KEEP_ON_CONFLICT: [&str; 3] = ["id", "profile_id", "created_at"];

fn columns(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::WalletMethods => &WALLET_METHOD_COLUMNS,
        Collection::SocialLinks => &SOCIAL_LINK_COLUMNS,
        Collection::Goals => &GOAL_COLUMNS,
    }
}

fn aliases<'a>(names: impl IntoIterator<Item = &'a &'a str>) -> Vec<Alias> {
    names.into_iter().map(|name| Alias::new(*name)).collect()
}

/// Map a driver error onto the fault taxonomy by SQLSTATE
pub fn classify(target: Target, error: tokio_postgres::Error) -> SyncError {
    let Some(db) = error.as_db_error() else {
        // Closed connection or socket failure
        return SyncError::transient(target, &error);
    };

    if *db.code() == SqlState::UNDEFINED_TABLE {
        return SyncError::MissingCollection(target);
    }
    match db.code().code().get(..2) {
        Some("22") | Some("23") => {
            let field = db.column().or(db.constraint()).unwrap_or("row");
            ValidationFault::new(target, field, db.message()).into()
        }
        _ => SyncError::unexpected(target, format!("{} ({})", db.message(), db.code().code())),
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, column: &str, target: Target) -> Result<T, SyncError> {
    row.try_get(column)
        .map_err(|e| SyncError::unexpected(target, format!("column {}: {}", column, e)))
}

fn wallet_method_from_row(row: &Row) -> Result<WalletMethodRecord, SyncError> {
    let target = Target::Collection(Collection::WalletMethods);
    let method_type: String = get(row, "method_type", target)?;
    let details: Option<serde_json::Value> = get(row, "details", target)?;

    Ok(WalletMethodRecord {
        id: get(row, "id", target)?,
        profile_id: get(row, "profile_id", target)?,
        method_type: method_type
            .parse()
            .map_err(|e: String| SyncError::unexpected(target, e))?,
        platform: get(row, "platform", target)?,
        name: get(row, "name", target)?,
        handle: get(row, "handle", target)?,
        url: get(row, "url", target)?,
        details: details
            .map(serde_json::from_value::<WalletDetails>)
            .transpose()
            .map_err(|e| SyncError::unexpected(target, format!("details: {}", e)))?,
        enabled: get(row, "enabled", target)?,
        order_index: get(row, "order_index", target)?,
        created_at: get(row, "created_at", target)?,
        updated_at: get(row, "updated_at", target)?,
    })
}

fn social_link_from_row(row: &Row) -> Result<SocialLinkRecord, SyncError> {
    let target = Target::Collection(Collection::SocialLinks);
    Ok(SocialLinkRecord {
        id: get(row, "id", target)?,
        profile_id: get(row, "profile_id", target)?,
        platform: get(row, "platform", target)?,
        username: get(row, "username", target)?,
        url: get(row, "url", target)?,
        photo_url: get(row, "photo_url", target)?,
        photo_caption: get(row, "photo_caption", target)?,
        wallet_method_id: get(row, "wallet_method_id", target)?,
        order_index: get(row, "order_index", target)?,
        created_at: get(row, "created_at", target)?,
        updated_at: get(row, "updated_at", target)?,
    })
}

fn goal_from_row(row: &Row) -> Result<GoalRecord, SyncError> {
    let target = Target::Collection(Collection::Goals);
    Ok(GoalRecord {
        id: get(row, "id", target)?,
        profile_id: get(row, "profile_id", target)?,
        title: get(row, "title", target)?,
        description: get(row, "description", target)?,
        target_amount: get(row, "target_amount", target)?,
        current_amount: get(row, "current_amount", target)?,
        wallet_method_id: get(row, "wallet_method_id", target)?,
        active: get(row, "active", target)?,
        order_index: get(row, "order_index", target)?,
        created_at: get(row, "created_at", target)?,
        updated_at: get(row, "updated_at", target)?,
    })
}

fn rows_from_pg(collection: Collection, rows: &[Row]) -> Result<CollectionRows, SyncError> {
    Ok(match collection {
        Collection::WalletMethods => CollectionRows::WalletMethods(
            rows.iter().map(wallet_method_from_row).collect::<Result<_, _>>()?,
        ),
        Collection::SocialLinks => CollectionRows::SocialLinks(
            rows.iter().map(social_link_from_row).collect::<Result<_, _>>()?,
        ),
        Collection::Goals => {
            CollectionRows::Goals(rows.iter().map(goal_from_row).collect::<Result<_, _>>()?)
        }
    })
}

fn sort_by_position(rows: &mut CollectionRows) {
    match rows {
        CollectionRows::WalletMethods(rows) => rows.sort_by_key(|r| r.order_index),
        CollectionRows::SocialLinks(rows) => rows.sort_by_key(|r| r.order_index),
        CollectionRows::Goals(rows) => rows.sort_by_key(|r| r.order_index),
    }
}

/// Column values of every row, in the order of [`columns`]
fn row_values(rows: &CollectionRows) -> Result<Vec<Vec<SimpleExpr>>, SyncError> {
    match rows {
        CollectionRows::WalletMethods(rows) => rows
            .iter()
            .map(|r| {
                let details = r
                    .details
                    .as_ref()
                    .map(serde_json::to_value)
                    .transpose()
                    .map_err(|e| SyncError::unexpected(Collection::WalletMethods, e))?;
                let values: Vec<SimpleExpr> = vec![
                    r.id.into(),
                    r.profile_id.into(),
                    r.method_type.to_string().into(),
                    r.platform.clone().into(),
                    r.name.clone().into(),
                    r.handle.clone().into(),
                    r.url.clone().into(),
                    details.into(),
                    r.enabled.into(),
                    r.order_index.into(),
                    r.created_at.into(),
                    r.updated_at.into(),
                ];
                Ok(values)
            })
            .collect(),
        CollectionRows::SocialLinks(rows) => Ok(rows
            .iter()
            .map(|r| -> Vec<SimpleExpr> {
                vec![
                    r.id.into(),
                    r.profile_id.into(),
                    r.platform.clone().into(),
                    r.username.clone().into(),
                    r.url.clone().into(),
                    r.photo_url.clone().into(),
                    r.photo_caption.clone().into(),
                    r.wallet_method_id.into(),
                    r.order_index.into(),
                    r.created_at.into(),
                    r.updated_at.into(),
                ]
            })
            .collect()),
        CollectionRows::Goals(rows) => Ok(rows
            .iter()
            .map(|r| -> Vec<SimpleExpr> {
                vec![
                    r.id.into(),
                    r.profile_id.into(),
                    r.title.clone().into(),
                    r.description.clone().into(),
                    r.target_amount.into(),
                    r.current_amount.into(),
                    r.wallet_method_id.into(),
                    r.active.into(),
                    r.order_index.into(),
                    r.created_at.into(),
                    r.updated_at.into(),
                ]
            })
            .collect()),
    }
}

/// Multi-row `INSERT .. RETURNING` for a non-empty batch
fn insert_statement(table: &str, rows: &CollectionRows) -> Result<InsertStatement, SyncError> {
    let collection = rows.collection();
    let columns = columns(collection);

    let mut insert = Query::insert();
    insert.into_table(Alias::new(table)).columns(aliases(columns));
    for values in row_values(rows)? {
        insert
            .values(values)
            .map_err(|e| SyncError::unexpected(collection, e))?;
    }
    insert.returning(Query::returning().columns(aliases(columns)));
    Ok(insert)
}

/// Insert or update by id. Rows whose id belongs to another owner are left
/// alone and not returned.
fn upsert_statement(
    table: &str,
    owner: OwnerId,
    rows: &CollectionRows,
) -> Result<InsertStatement, SyncError> {
    let updated: Vec<Alias> = columns(rows.collection())
        .iter()
        .filter(|column| !KEEP_ON_CONFLICT.contains(*column))
        .map(|column| Alias::new(*column))
        .collect();

    let mut insert = insert_statement(table, rows)?;
    insert.on_conflict(
        OnConflict::column(Alias::new("id"))
            .update_columns(updated)
            .action_and_where(Expr::col((Alias::new(table), Alias::new("profile_id"))).eq(owner))
            .to_owned(),
    );
    Ok(insert)
}

/// Column assignments for the fields a patch changes
fn patch_assignments(patch: &ProfileFieldsPatch) -> Vec<(&'static str, SimpleExpr)> {
    let mut assignments: Vec<(&'static str, SimpleExpr)> = Vec::new();
    if let Some(name) = &patch.display_name {
        assignments.push(("display_name", name.clone().into()));
    }
    let nullable = [
        ("bio", &patch.bio),
        ("avatar_url", &patch.avatar_url),
        ("banner_url", &patch.banner_url),
        ("location", &patch.location),
        ("theme_id", &patch.theme_id),
    ];
    for (column, value) in nullable {
        if let Some(value) = value {
            assignments.push((column, value.clone().into()));
        }
    }
    let flags = [
        ("show_wallet", patch.show_wallet),
        ("show_socials", patch.show_socials),
        ("show_goals", patch.show_goals),
    ];
    for (column, value) in flags {
        if let Some(value) = value {
            assignments.push((column, value.into()));
        }
    }
    assignments
}

/// Create the profile row with the patched fields, or update just those
/// fields on the existing row
fn profile_upsert_statement(
    table: &str,
    owner: OwnerId,
    patch: &ProfileFieldsPatch,
    now: DateTime<Utc>,
) -> Result<Option<InsertStatement>, SyncError> {
    let mut assignments = patch_assignments(patch);
    if assignments.is_empty() {
        return Ok(None);
    }
    assignments.push(("updated_at", now.into()));

    let names: Vec<&str> = assignments.iter().map(|(column, _)| *column).collect();
    let mut values: Vec<SimpleExpr> = vec![owner.into()];
    values.extend(assignments.into_iter().map(|(_, value)| value));

    let mut insert = Query::insert();
    insert
        .into_table(Alias::new(table))
        .columns(std::iter::once(Alias::new("id")).chain(aliases(&names)))
        .values(values)
        .map_err(|e| SyncError::unexpected(Target::Profile, e))?
        .on_conflict(OnConflict::column(Alias::new("id")).update_columns(aliases(&names)).to_owned());
    Ok(Some(insert))
}

/// Bare profile row for `owner`, left alone when one exists
fn profile_stub_statement(table: &str, owner: OwnerId) -> Result<InsertStatement, SyncError> {
    let mut insert = Query::insert();
    insert
        .into_table(Alias::new(table))
        .columns([Alias::new("id")])
        .values([owner.into()])
        .map_err(|e| SyncError::unexpected(Target::Profile, e))?
        .on_conflict(OnConflict::column(Alias::new("id")).do_nothing().to_owned());
    Ok(insert)
}

type PgConnection<'a> = PooledConnection<'a, PostgresConnectionManager<NoTls>>;

pub struct PostgresGateway {
    pool: PgPool,
    tables: TableNames,
}

impl PostgresGateway {
    pub fn new(pool: PgPool, tables: TableNames) -> Self {
        Self { pool, tables }
    }

    /// Connect to `database_url` with a pool of `pool_size` connections
    pub async fn connect(database_url: &str, tables: TableNames, pool_size: u32) -> anyhow::Result<Self> {
        let pool = crate::db_connection::connect(database_url, pool_size).await?;
        Ok(Self::new(pool, tables))
    }

    async fn connection(&self, target: Target) -> Result<PgConnection<'_>, SyncError> {
        self.pool.get().await.map_err(|e| match e {
            RunError::User(e) => classify(target, e),
            RunError::TimedOut => SyncError::transient(target, "timed out waiting for a database connection"),
        })
    }

    /// Collection rows reference the profile row, which the scalar field
    /// write creates only at the end of an update
    async fn ensure_profile_row(&self, client: &Client, owner: OwnerId, target: Target) -> Result<(), SyncError> {
        let (sql, values) = profile_stub_statement(&self.tables.profile, owner)?.build_postgres(PostgresQueryBuilder);
        match client.execute(sql.as_str(), &values.as_params()).await {
            Ok(created) => {
                if created > 0 {
                    tracing::debug!(%owner, "created profile row for collection write");
                }
                Ok(())
            }
            Err(e) => match classify(target, e) {
                // Without a profile table nothing can reference it
                SyncError::MissingCollection(_) => Ok(()),
                other => Err(other),
            },
        }
    }
}

#[async_trait]
impl PersistenceGateway for PostgresGateway {
    async fn load_profile(&self, owner: OwnerId) -> Result<ProfileFields, SyncError> {
        let target = Target::Profile;
        let (sql, values) = Query::select()
            .columns(aliases(&PROFILE_COLUMNS))
            .from(Alias::new(self.tables.profile.as_str()))
            .and_where(Expr::col(Alias::new("id")).eq(owner))
            .build_postgres(PostgresQueryBuilder);

        let client = self.connection(target).await?;
        let row = client
            .query_opt(sql.as_str(), &values.as_params())
            .await
            .map_err(|e| classify(target, e))?;

        let Some(row) = row else {
            tracing::debug!(%owner, "no profile row yet, using defaults");
            return Ok(ProfileFields::default());
        };
        Ok(ProfileFields {
            display_name: get(&row, "display_name", target)?,
            bio: get(&row, "bio", target)?,
            avatar_url: get(&row, "avatar_url", target)?,
            banner_url: get(&row, "banner_url", target)?,
            location: get(&row, "location", target)?,
            theme_id: get(&row, "theme_id", target)?,
            visibility: SectionVisibility {
                wallet: get(&row, "show_wallet", target)?,
                socials: get(&row, "show_socials", target)?,
                goals: get(&row, "show_goals", target)?,
            },
        })
    }

    async fn load_collection(
        &self,
        owner: OwnerId,
        collection: Collection,
    ) -> Result<Loaded<CollectionRows>, SyncError> {
        let (sql, values) = Query::select()
            .columns(aliases(columns(collection)))
            .from(Alias::new(self.tables.collection(collection)))
            .and_where(Expr::col(Alias::new("profile_id")).eq(owner))
            .order_by(Alias::new("order_index"), Order::Asc)
            .order_by(Alias::new("created_at"), Order::Asc)
            .build_postgres(PostgresQueryBuilder);

        let client = self.connection(collection.into()).await?;
        match client.query(sql.as_str(), &values.as_params()).await {
            Ok(rows) => Ok(Loaded::Present(rows_from_pg(collection, &rows)?)),
            Err(e) => match classify(collection.into(), e) {
                SyncError::MissingCollection(_) => Ok(Loaded::Missing),
                other => Err(other),
            },
        }
    }

    async fn replace_collection(
        &self,
        owner: OwnerId,
        mut rows: CollectionRows,
    ) -> Result<CollectionRows, SyncError> {
        let collection = rows.collection();
        let target = Target::Collection(collection);
        let table = self.tables.collection(collection);
        rows.assign_missing_ids();

        let (delete_sql, delete_values) = Query::delete()
            .from_table(Alias::new(table))
            .and_where(Expr::col(Alias::new("profile_id")).eq(owner))
            .build_postgres(PostgresQueryBuilder);

        let mut client = self.connection(target).await?;
        self.ensure_profile_row(&client, owner, target).await?;
        let tx = client.transaction().await.map_err(|e| classify(target, e))?;
        let deleted = tx
            .execute(delete_sql.as_str(), &delete_values.as_params())
            .await
            .map_err(|e| classify(target, e))?;

        let mut committed = if rows.is_empty() {
            CollectionRows::empty(collection)
        } else {
            let (sql, values) = insert_statement(table, &rows)?.build_postgres(PostgresQueryBuilder);
            let stored = tx
                .query(sql.as_str(), &values.as_params())
                .await
                .map_err(|e| classify(target, e))?;
            rows_from_pg(collection, &stored)?
        };
        tx.commit().await.map_err(|e| classify(target, e))?;

        tracing::debug!(%collection, deleted, inserted = committed.len(), "collection replaced");
        sort_by_position(&mut committed);
        Ok(committed)
    }

    async fn upsert_collection(
        &self,
        owner: OwnerId,
        mut rows: CollectionRows,
    ) -> Result<CollectionRows, SyncError> {
        let collection = rows.collection();
        let target = Target::Collection(collection);
        if rows.is_empty() {
            return Ok(rows);
        }
        rows.assign_missing_ids();

        let (sql, values) = upsert_statement(self.tables.collection(collection), owner, &rows)?
            .build_postgres(PostgresQueryBuilder);

        let mut client = self.connection(target).await?;
        self.ensure_profile_row(&client, owner, target).await?;
        let tx = client.transaction().await.map_err(|e| classify(target, e))?;
        let stored = tx
            .query(sql.as_str(), &values.as_params())
            .await
            .map_err(|e| classify(target, e))?;

        // Rows owned by another profile are skipped by the conflict clause
        if stored.len() < rows.len() {
            tx.rollback().await.map_err(|e| classify(target, e))?;
            return Err(ValidationFault::new(target, "id", "id belongs to another profile").into());
        }
        tx.commit().await.map_err(|e| classify(target, e))?;
        let mut committed = rows_from_pg(collection, &stored)?;
        sort_by_position(&mut committed);
        Ok(committed)
    }

    async fn delete_rows(&self, collection: Collection, ids: &[Uuid]) -> Result<(), SyncError> {
        if ids.is_empty() {
            return Ok(());
        }
        let (sql, values) = Query::delete()
            .from_table(Alias::new(self.tables.collection(collection)))
            .and_where(Expr::col(Alias::new("id")).is_in(ids.iter().copied()))
            .build_postgres(PostgresQueryBuilder);

        let client = self.connection(collection.into()).await?;
        let deleted = client
            .execute(sql.as_str(), &values.as_params())
            .await
            .map_err(|e| classify(collection.into(), e))?;
        tracing::debug!(%collection, deleted, "rows deleted");
        Ok(())
    }

    async fn update_scalar_fields(
        &self,
        owner: OwnerId,
        patch: &ProfileFieldsPatch,
    ) -> Result<(), SyncError> {
        let Some(statement) = profile_upsert_statement(&self.tables.profile, owner, patch, Utc::now())? else {
            return Ok(());
        };
        let (sql, values) = statement.build_postgres(PostgresQueryBuilder);

        let client = self.connection(Target::Profile).await?;
        client
            .execute(sql.as_str(), &values.as_params())
            .await
            .map_err(|e| classify(Target::Profile, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Goal, SocialLink};
    use crate::reconciler::Reconciler;
    use crate::refresh::RefreshLoader;
    use crate::update::ProfileUpdate;
    use std::sync::Arc;

    fn link_row(owner: OwnerId, url: &str) -> SocialLinkRecord {
        SocialLinkRecord {
            profile_id: owner,
            platform: "instagram".to_string(),
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_never_overwrites_created_at() {
        let owner = Uuid::new_v4();
        let mut rows = CollectionRows::SocialLinks(vec![link_row(owner, "https://instagram.com/a")]);
        rows.assign_missing_ids();

        let sql = upsert_statement("social_links", owner, &rows)
            .unwrap()
            .to_string(PostgresQueryBuilder);

        assert!(sql.starts_with(r#"INSERT INTO "social_links""#));
        assert!(sql.contains(r#"ON CONFLICT ("id") DO UPDATE SET"#));
        assert!(sql.contains(r#""updated_at" = "excluded"."updated_at""#));
        assert!(!sql.contains(r#""created_at" = "excluded"."created_at""#));
        assert!(!sql.contains(r#""profile_id" = "excluded"."profile_id""#));
        assert!(sql.contains("RETURNING"));
    }

    #[test]
    fn test_profile_upsert_only_sets_patched_fields() {
        let patch = ProfileFieldsPatch {
            bio: Some(None),
            show_goals: Some(false),
            ..Default::default()
        };
        let sql = profile_upsert_statement("profiles", Uuid::new_v4(), &patch, Utc::now())
            .unwrap()
            .unwrap()
            .to_string(PostgresQueryBuilder);

        assert!(sql.contains(r#""bio" = "excluded"."bio""#));
        assert!(sql.contains(r#""show_goals" = "excluded"."show_goals""#));
        assert!(!sql.contains("display_name"));
        let empty = profile_upsert_statement("profiles", Uuid::new_v4(), &ProfileFieldsPatch::default(), Utc::now());
        assert!(empty.unwrap().is_none());
    }

    #[test]
    fn test_patch_assignments_clear_nullable_fields() {
        let patch = ProfileFieldsPatch {
            display_name: Some("Ada".to_string()),
            location: Some(None),
            ..Default::default()
        };
        let columns: Vec<&str> = patch_assignments(&patch).into_iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["display_name", "location"]);
    }

    #[test]
    fn test_profile_stub_leaves_existing_row_alone() {
        let owner = Uuid::new_v4();
        let sql = profile_stub_statement("profiles", owner)
            .unwrap()
            .to_string(PostgresQueryBuilder);

        assert!(sql.starts_with(r#"INSERT INTO "profiles" ("id") VALUES"#));
        assert!(sql.contains(&owner.to_string()));
        assert!(sql.contains(r#"ON CONFLICT ("id") DO NOTHING"#));
    }

    fn database_url() -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgresql://localhost/test".to_string())
    }

    static SCHEMA: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

    async fn test_gateway() -> Arc<PostgresGateway> {
        let pool = crate::db_connection::connect(&database_url(), 4).await.unwrap();
        SCHEMA
            .get_or_init(|| async {
                let client = pool.get().await.unwrap();
                client.batch_execute(include_str!("../sql/schema.sql")).await.unwrap();
            })
            .await;
        Arc::new(PostgresGateway::new(pool, TableNames::default()))
    }

    #[tokio::test]
    #[ignore] // Requires a running PostgreSQL database
    async fn test_first_sync_without_profile_row() {
        let gateway = test_gateway().await;
        let owner = Uuid::new_v4();

        let update = ProfileUpdate::new()
            .wallet_methods(Vec::new())
            .social_links(vec![SocialLink::new("Twitter", "https://x.com/a")])
            .goals(vec![Goal::new("New studio", 1000.0, 250.0)]);
        let report = Reconciler::new(gateway.clone()).reconcile(owner, &update).await.unwrap();
        assert!(report.rejections().is_empty());

        let canonical = RefreshLoader::new(gateway).load(owner).await.unwrap();
        assert_eq!(canonical.draft.social_links.len(), 1);
        assert_eq!(canonical.draft.social_links[0].platform, "twitter");
        assert_eq!(canonical.draft.goals.len(), 1);
        assert_eq!(canonical.draft.goals[0].current_amount, Some(250.0));
        assert_eq!(canonical.draft.fields.display_name, "");
    }

    #[tokio::test]
    #[ignore] // Requires a running PostgreSQL database
    async fn test_stalled_call_does_not_block_other_calls() {
        let gateway = test_gateway().await;
        let owner = Uuid::new_v4();

        let blocker_pool = crate::db_connection::connect(&database_url(), 1).await.unwrap();
        let mut blocker = blocker_pool.get().await.unwrap();
        let lock = blocker.transaction().await.unwrap();
        lock.batch_execute("LOCK TABLE goals IN ACCESS EXCLUSIVE MODE").await.unwrap();

        let stalled = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.load_collection(owner, Collection::Goals).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let unrelated = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            gateway.load_collection(owner, Collection::WalletMethods),
        )
        .await;
        assert!(matches!(unrelated, Ok(Ok(Loaded::Present(_)))));
        assert!(!stalled.is_finished());

        lock.rollback().await.unwrap();
        assert!(stalled.await.unwrap().is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires a running PostgreSQL database
    async fn test_foreign_id_upsert_writes_nothing() {
        let gateway = test_gateway().await;
        let (owner, other) = (Uuid::new_v4(), Uuid::new_v4());

        let mut theirs = CollectionRows::SocialLinks(vec![link_row(other, "https://instagram.com/b")]);
        theirs.assign_missing_ids();
        let theirs = gateway.upsert_collection(other, theirs).await.unwrap();

        let mut rows = vec![link_row(owner, "https://instagram.com/a")];
        if let CollectionRows::SocialLinks(stored) = &theirs {
            let mut stolen = link_row(owner, "https://instagram.com/c");
            stolen.id = stored[0].id;
            rows.push(stolen);
        }
        let err = gateway
            .upsert_collection(owner, CollectionRows::SocialLinks(rows))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FaultKind::Validation);

        let mine = gateway.load_collection(owner, Collection::SocialLinks).await.unwrap();
        assert!(matches!(mine, Loaded::Present(rows) if rows.is_empty()));
        let still_theirs = gateway.load_collection(other, Collection::SocialLinks).await.unwrap();
        assert!(matches!(still_theirs, Loaded::Present(rows) if rows.ids() == theirs.ids()));
    }

    #[tokio::test]
    #[ignore] // Requires a running PostgreSQL database
    async fn test_round_trip_against_postgres() {
        let gateway = test_gateway().await;
        let owner = Uuid::new_v4();
        let reconciler = Reconciler::new(gateway.clone());

        let update = ProfileUpdate::new()
            .fields(ProfileFieldsPatch {
                display_name: Some("Ada".to_string()),
                ..Default::default()
            })
            .social_links(vec![SocialLink::new("Twitter", "https://x.com/ada")])
            .goals(vec![Goal::new("Studio", 1000.0, 250.0)]);
        reconciler.reconcile(owner, &update).await.unwrap();

        let first = RefreshLoader::new(gateway.clone()).load(owner).await.unwrap();
        assert_eq!(first.draft.fields.display_name, "Ada");
        assert_eq!(first.draft.social_links[0].platform, "twitter");
        assert_eq!(first.draft.goals[0].target_amount, Some(1000.0));

        let mut relabelled = first.draft.social_links.clone();
        relabelled[0].username = "ada".to_string();
        reconciler
            .reconcile(owner, &ProfileUpdate::new().social_links(relabelled))
            .await
            .unwrap();

        let second = RefreshLoader::new(gateway).load(owner).await.unwrap();
        assert_eq!(second.draft.social_links[0].id, first.draft.social_links[0].id);
        assert_eq!(second.draft.goals, first.draft.goals);
    }
}
