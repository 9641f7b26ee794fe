use crate::connection::{Connection, Gateway, Transaction};
use crate::core::{EntityId, NamespaceId, PersistenceError, Result, Value};
use crate::model::{Dome, NewTree, PlantType, Tree};
use chrono::Utc;
use sqlx::Row;
use sqlx::any::AnyRow;

pub(crate) const TREE_COLUMNS: &str = "id, dome_id, name, breed, info, internal_row, internal_col, \
     life_days, plant_type, mother_plant_id, paste_metadata";

const DOME_COLUMNS: &str = "id, name, internal_rows, internal_cols, farm_id";

/// Domes and trees
///
/// Opens one connection per call.
#[derive(Debug, Clone)]
pub struct TreeRepository {
    gateway: Gateway,
}

impl TreeRepository {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn create_dome(
        &self,
        name: &str,
        rows: i64,
        cols: i64,
        farm_id: Option<i64>,
    ) -> Result<Dome> {
        let mut conn = self.gateway.connect().await?;
        let row = conn
            .fetch_optional(
                &format!(
                    "INSERT INTO dome (name, internal_rows, internal_cols, farm_id) \
                     VALUES ($1, $2, $3, $4) RETURNING {DOME_COLUMNS}"
                ),
                &[name.into(), rows.into(), cols.into(), farm_id.into()],
            )
            .await?;
        match row {
            Some(row) => dome_from_row(&row),
            None => Err(PersistenceError::Query("insert into dome returned no row".into())),
        }
    }

    pub async fn dome(&self, id: NamespaceId) -> Result<Option<Dome>> {
        let mut conn = self.gateway.connect().await?;
        conn.fetch_optional(
            &format!("SELECT {DOME_COLUMNS} FROM dome WHERE id = $1"),
            &[id.into()],
        )
        .await?
        .as_ref()
        .map(dome_from_row)
        .transpose()
    }

    pub async fn insert(&self, tree: &NewTree) -> Result<Tree> {
        let mut conn = self.gateway.connect().await?;
        let mut tx = conn.begin().await?;
        let created = insert_tree(&mut tx, tree).await?;
        tx.commit().await?;
        Ok(created)
    }

    pub async fn get(&self, id: EntityId) -> Result<Option<Tree>> {
        let mut conn = self.gateway.connect().await?;
        conn.fetch_optional(
            &format!("SELECT {TREE_COLUMNS} FROM tree WHERE id = $1"),
            &[id.into()],
        )
        .await?
        .as_ref()
        .map(tree_from_row)
        .transpose()
    }

    /// Trees with the given ids, in the order the ids were given.
    /// Unknown ids are skipped.
    pub async fn load(&self, ids: &[EntityId]) -> Result<Vec<Tree>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let params: Vec<Value> = ids.iter().map(|&id| id.into()).collect();

        let mut conn = self.gateway.connect().await?;
        let rows = conn
            .fetch_all(
                &format!("SELECT {TREE_COLUMNS} FROM tree WHERE id IN ({placeholders})"),
                &params,
            )
            .await?;
        let mut found = rows.iter().map(tree_from_row).collect::<Result<Vec<_>>>()?;
        found.sort_by_key(|tree| ids.iter().position(|&id| id == tree.id));
        Ok(found)
    }

    /// Every tree of a dome, row-major
    pub async fn list_in_dome(&self, dome_id: NamespaceId) -> Result<Vec<Tree>> {
        let mut conn = self.gateway.connect().await?;
        list_in_dome(&mut conn, dome_id).await
    }

    /// `(id, life_days)` for every tree, ordered by id
    pub async fn counters(&self) -> Result<Vec<(EntityId, Option<i64>)>> {
        let mut conn = self.gateway.connect().await?;
        let rows = conn
            .fetch_all("SELECT id, life_days FROM tree ORDER BY id", &[])
            .await?;
        let mut counters = Vec::with_capacity(rows.len());
        for row in rows {
            counters.push((row.try_get("id")?, row.try_get("life_days")?));
        }
        Ok(counters)
    }
}

async fn list_in_dome(conn: &mut Connection, dome_id: NamespaceId) -> Result<Vec<Tree>> {
    let rows = conn
        .fetch_all(
            &format!(
                "SELECT {TREE_COLUMNS} FROM tree WHERE dome_id = $1 \
                 ORDER BY internal_row, internal_col, id"
            ),
            &[dome_id.into()],
        )
        .await?;
    rows.iter().map(tree_from_row).collect()
}

/// Dome lookup inside an open transaction
pub(crate) async fn fetch_dome(tx: &mut Transaction<'_>, id: NamespaceId) -> Result<Option<Dome>> {
    tx.fetch_optional(
        &format!("SELECT {DOME_COLUMNS} FROM dome WHERE id = $1"),
        &[id.into()],
    )
    .await?
    .as_ref()
    .map(dome_from_row)
    .transpose()
}

/// Insert inside an open transaction
pub(crate) async fn insert_tree(tx: &mut Transaction<'_>, tree: &NewTree) -> Result<Tree> {
    let now = Utc::now().to_rfc3339();
    let row = tx
        .fetch_one(
            &format!(
                "INSERT INTO tree (dome_id, name, breed, info, internal_row, internal_col, \
                 life_days, plant_type, mother_plant_id, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 RETURNING {TREE_COLUMNS}"
            ),
            &[
                tree.dome_id.into(),
                tree.name.as_str().into(),
                tree.breed.clone().into(),
                tree.info.clone().into(),
                tree.internal_row.into(),
                tree.internal_col.into(),
                tree.life_days.into(),
                tree.plant_type.as_str().into(),
                tree.mother_plant_id.into(),
                now.clone().into(),
                now.into(),
            ],
        )
        .await?;
    tree_from_row(&row)
}

pub(crate) fn tree_from_row(row: &AnyRow) -> Result<Tree> {
    let plant_type: Option<String> = row.try_get("plant_type")?;
    Ok(Tree {
        id: row.try_get("id")?,
        dome_id: row.try_get("dome_id")?,
        name: row.try_get("name")?,
        breed: row.try_get("breed")?,
        info: row.try_get("info")?,
        internal_row: row.try_get("internal_row")?,
        internal_col: row.try_get("internal_col")?,
        life_days: row.try_get("life_days")?,
        plant_type: PlantType::parse(plant_type.as_deref()),
        mother_plant_id: row.try_get("mother_plant_id")?,
        paste_metadata: row.try_get("paste_metadata")?,
    })
}

fn dome_from_row(row: &AnyRow) -> Result<Dome> {
    Ok(Dome {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        internal_rows: row.try_get::<Option<i64>, _>("internal_rows")?.unwrap_or(5),
        internal_cols: row.try_get::<Option<i64>, _>("internal_cols")?.unwrap_or(5),
        farm_id: row.try_get("farm_id")?,
    })
}
