//! Cloning trees into another dome while keeping mother/cutting links.
//!
//! Cloning runs in two passes. The first creates every clone and records
//! `source id -> clone id`; the second rewrites each clone's parent through
//! that map. Because the map is complete before any link is rewritten, the
//! order of the source set does not matter: a cutting listed before its
//! mother is still linked to the mother's clone. A parent outside the
//! source set cannot be remapped, so the clone gets no parent and the link
//! is reported as broken. Such a clone keeps its plant type, so a cutting
//! whose mother stayed behind is stored as a cutting without a mother; the
//! original mother id survives in its paste metadata.
//!
//! Every clone must land inside the destination dome's grid. The whole
//! request is checked before the first clone is written.

pub mod sink;

pub use sink::{CloneSink, MemorySink};

use crate::connection::Gateway;
use crate::core::{EntityId, NamespaceId, PersistenceError, RemapError};
use crate::model::{Dome, Tree};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapRequest {
    pub source_entities: Vec<Tree>,
    pub destination_namespace: NamespaceId,
    /// Added to every clone's row
    #[serde(default)]
    pub row_offset: i64,
    /// Added to every clone's column
    #[serde(default)]
    pub col_offset: i64,
}

impl RemapRequest {
    pub fn new(source_entities: Vec<Tree>, destination_namespace: NamespaceId) -> Self {
        Self {
            source_entities,
            destination_namespace,
            row_offset: 0,
            col_offset: 0,
        }
    }

    pub fn offset(mut self, rows: i64, cols: i64) -> Self {
        self.row_offset = rows;
        self.col_offset = cols;
        self
    }
}

/// A parent link that pointed outside the source set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenRelationship {
    pub new_id: EntityId,
    pub missing_original_parent_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemapOutcome {
    pub paste_id: Uuid,
    /// Clones in source order, with their final parent links
    pub created: Vec<Tree>,
    pub created_count: usize,
    pub preserved_relationships: usize,
    pub broken_relationships: Vec<BrokenRelationship>,
}

/// Provenance stored on every clone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteMetadata {
    pub paste_id: Uuid,
    pub paste_timestamp: DateTime<Utc>,
    pub original_tree_id: EntityId,
    pub original_mother_id: Option<EntityId>,
    pub relationship_preserved: bool,
}

impl PasteMetadata {
    pub fn to_json(&self) -> Result<String, PersistenceError> {
        serde_json::to_string(self)
            .map_err(|e| PersistenceError::Query(format!("encoding paste metadata: {e}")))
    }

    pub fn from_tree(tree: &Tree) -> Option<Self> {
        tree.paste_metadata
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

/// Clone `request.source_entities` into `sink`
///
/// Duplicate source ids, a missing destination dome and positions outside
/// its grid are rejected before anything is written. Errors from the sink
/// abort immediately; undoing partial writes is the sink's business.
pub async fn clone_into<S>(
    sink: &mut S,
    request: &RemapRequest,
    paste_id: Uuid,
    pasted_at: DateTime<Utc>,
) -> Result<RemapOutcome, RemapError>
where
    S: CloneSink + ?Sized,
{
    let sources = &request.source_entities;

    let mut seen = HashSet::with_capacity(sources.len());
    for source in sources {
        if !seen.insert(source.id) {
            return Err(RemapError::DuplicateSource(source.id));
        }
    }

    let dome = sink
        .destination(request.destination_namespace)
        .await?
        .ok_or_else(|| {
            RemapError::Constraint(PersistenceError::ConstraintViolation(format!(
                "dome {} does not exist",
                request.destination_namespace
            )))
        })?;

    let mut drafts = Vec::with_capacity(sources.len());
    for source in sources {
        let row = source.internal_row + request.row_offset;
        let col = source.internal_col + request.col_offset;
        check_inside(&dome, row, col)?;
        drafts.push(source.draft_copy(dome.id, row, col));
    }

    let mut id_map: HashMap<EntityId, EntityId> = HashMap::with_capacity(sources.len());
    let mut created = Vec::with_capacity(sources.len());
    for (source, draft) in sources.iter().zip(&drafts) {
        let clone = sink.create(draft).await?;
        id_map.insert(source.id, clone.id);
        created.push(clone);
    }

    let mut preserved_relationships = 0;
    let mut broken_relationships = Vec::new();
    for (source, clone) in sources.iter().zip(created.iter_mut()) {
        let parent = match source.mother_plant_id {
            None => None,
            Some(original) => match id_map.get(&original) {
                Some(&mapped) => {
                    preserved_relationships += 1;
                    Some(mapped)
                }
                None => {
                    broken_relationships.push(BrokenRelationship {
                        new_id: clone.id,
                        missing_original_parent_id: original,
                    });
                    None
                }
            },
        };

        let metadata = PasteMetadata {
            paste_id,
            paste_timestamp: pasted_at,
            original_tree_id: source.id,
            original_mother_id: source.mother_plant_id,
            relationship_preserved: parent.is_some(),
        };
        sink.relink(clone.id, parent, &metadata).await?;

        clone.mother_plant_id = parent;
        clone.paste_metadata = Some(metadata.to_json()?);
    }

    Ok(RemapOutcome {
        paste_id,
        created_count: created.len(),
        created,
        preserved_relationships,
        broken_relationships,
    })
}

fn check_inside(dome: &Dome, row: i64, col: i64) -> Result<(), RemapError> {
    if (0..dome.internal_rows).contains(&row) && (0..dome.internal_cols).contains(&col) {
        return Ok(());
    }
    Err(RemapError::Constraint(PersistenceError::ConstraintViolation(
        format!(
            "cell ({row}, {col}) is outside the grid of dome {} ({}x{})",
            dome.id, dome.internal_rows, dome.internal_cols
        ),
    )))
}

/// Runs [`clone_into`] against the database, all-or-nothing
#[derive(Debug, Clone)]
pub struct Remapper {
    gateway: Gateway,
}

impl Remapper {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Clone the trees in one transaction
    ///
    /// Any failure (an occupied cell, a position outside the grid, a missing
    /// destination dome, a lost connection) rolls back every clone of this
    /// request.
    pub async fn remap(&self, request: &RemapRequest) -> Result<RemapOutcome, RemapError> {
        let paste_id = Uuid::new_v4();
        let mut conn = self.gateway.connect().await?;
        let mut tx = conn.begin().await?;

        match clone_into(&mut tx, request, paste_id, Utc::now()).await {
            Ok(outcome) => {
                tx.commit().await?;
                info!(
                    %paste_id,
                    destination = request.destination_namespace,
                    created = outcome.created_count,
                    preserved = outcome.preserved_relationships,
                    broken = outcome.broken_relationships.len(),
                    "trees remapped"
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback of failed remap also failed");
                }
                warn!(%paste_id, error = %err, "remap rolled back");
                Err(err)
            }
        }
    }
}
