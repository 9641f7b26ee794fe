use super::PasteMetadata;
use crate::connection::Transaction;
use crate::core::{EntityId, NamespaceId, PersistenceError, Result};
use crate::model::{Dome, NewTree, Tree};
use crate::repository::trees::{fetch_dome, insert_tree};
use async_trait::async_trait;
use chrono::Utc;

/// Destination the remapper writes clones into
#[async_trait]
pub trait CloneSink: Send {
    /// The dome clones will be planted in, if it exists
    async fn destination(&mut self, id: NamespaceId) -> Result<Option<Dome>>;

    /// Insert a clone and return it with its new id
    async fn create(&mut self, draft: &NewTree) -> Result<Tree>;

    /// Set the parent link and paste metadata of an inserted clone
    async fn relink(
        &mut self,
        id: EntityId,
        parent: Option<EntityId>,
        metadata: &PasteMetadata,
    ) -> Result<()>;
}

#[async_trait]
impl<'c> CloneSink for Transaction<'c> {
    async fn destination(&mut self, id: NamespaceId) -> Result<Option<Dome>> {
        fetch_dome(self, id).await
    }

    async fn create(&mut self, draft: &NewTree) -> Result<Tree> {
        insert_tree(self, draft).await
    }

    async fn relink(
        &mut self,
        id: EntityId,
        parent: Option<EntityId>,
        metadata: &PasteMetadata,
    ) -> Result<()> {
        let updated = self
            .execute(
                "UPDATE tree SET mother_plant_id = $1, paste_metadata = $2, updated_at = $3 \
                 WHERE id = $4",
                &[
                    parent.into(),
                    metadata.to_json()?.into(),
                    Utc::now().to_rfc3339().into(),
                    id.into(),
                ],
            )
            .await?;
        if updated != 1 {
            return Err(PersistenceError::ConstraintViolation(format!(
                "clone {id} vanished before relink"
            )));
        }
        Ok(())
    }
}

/// Sink that keeps clones in memory
///
/// Enforces one tree per grid cell, like the database index does.
#[derive(Debug, Clone)]
pub struct MemorySink {
    next_id: EntityId,
    domes: Vec<Dome>,
    trees: Vec<Tree>,
}

impl MemorySink {
    /// Ids are handed out from `first_id` upwards
    pub fn new(first_id: EntityId) -> Self {
        Self {
            next_id: first_id,
            domes: Vec::new(),
            trees: Vec::new(),
        }
    }

    pub fn with_dome(mut self, dome: Dome) -> Self {
        self.domes.push(dome);
        self
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn get(&self, id: EntityId) -> Option<&Tree> {
        self.trees.iter().find(|t| t.id == id)
    }
}

#[async_trait]
impl CloneSink for MemorySink {
    async fn destination(&mut self, id: NamespaceId) -> Result<Option<Dome>> {
        Ok(self.domes.iter().find(|d| d.id == id).cloned())
    }

    async fn create(&mut self, draft: &NewTree) -> Result<Tree> {
        let occupied = self.trees.iter().any(|t| {
            t.dome_id == draft.dome_id
                && t.internal_row == draft.internal_row
                && t.internal_col == draft.internal_col
        });
        if occupied {
            return Err(PersistenceError::ConstraintViolation(format!(
                "cell ({}, {}) of dome {} is occupied",
                draft.internal_row, draft.internal_col, draft.dome_id
            )));
        }

        let tree = Tree {
            id: self.next_id,
            dome_id: draft.dome_id,
            name: draft.name.clone(),
            breed: draft.breed.clone(),
            info: draft.info.clone(),
            internal_row: draft.internal_row,
            internal_col: draft.internal_col,
            life_days: draft.life_days,
            plant_type: draft.plant_type,
            mother_plant_id: draft.mother_plant_id,
            paste_metadata: None,
        };
        self.next_id += 1;
        self.trees.push(tree.clone());
        Ok(tree)
    }

    async fn relink(
        &mut self,
        id: EntityId,
        parent: Option<EntityId>,
        metadata: &PasteMetadata,
    ) -> Result<()> {
        let json = metadata.to_json()?;
        let tree = self
            .trees
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PersistenceError::ConstraintViolation(format!("no tree {id}")))?;
        tree.mother_plant_id = parent;
        tree.paste_metadata = Some(json);
        Ok(())
    }
}
