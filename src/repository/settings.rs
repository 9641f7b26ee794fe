//! Grid dimensions for farm and dome views.
//!
//! Reads never fail: when the store is unreachable the caller gets the
//! built-in default together with the reason it was used.

use crate::connection::Gateway;
use crate::core::{PersistenceError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::any::AnyRow;
use tracing::warn;

/// Which grid a setting applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridKind {
    Farm,
    Dome,
}

impl GridKind {
    /// Storage key; dome grids may be overridden per farm
    pub fn key(&self, farm_id: Option<i64>) -> String {
        match (self, farm_id) {
            (Self::Dome, Some(farm)) => format!("farm_{farm}_dome"),
            (Self::Dome, None) => "dome".to_string(),
            (Self::Farm, _) => "farm".to_string(),
        }
    }

    pub fn default_settings(&self, farm_id: Option<i64>) -> GridSettings {
        let (rows, cols) = match (self, farm_id) {
            (Self::Farm, _) => (10, 10),
            (Self::Dome, Some(_)) => (8, 8),
            (Self::Dome, None) => (10, 10),
        };
        GridSettings {
            grid_type: self.key(farm_id),
            rows,
            cols,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSettings {
    pub grid_type: String,
    pub rows: i64,
    pub cols: i64,
}

/// Result of a settings lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum GridSettingsOutcome {
    Stored(GridSettings),
    Default { settings: GridSettings, reason: String },
}

impl GridSettingsOutcome {
    pub fn settings(&self) -> &GridSettings {
        match self {
            Self::Stored(settings) | Self::Default { settings, .. } => settings,
        }
    }

    pub fn into_settings(self) -> GridSettings {
        match self {
            Self::Stored(settings) | Self::Default { settings, .. } => settings,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default { .. })
    }
}

#[derive(Debug, Clone)]
pub struct GridSettingsStore {
    gateway: Gateway,
}

impl GridSettingsStore {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Stored settings, creating the default row on first access
    pub async fn load(&self, kind: GridKind, farm_id: Option<i64>) -> GridSettingsOutcome {
        match self.load_or_create(kind, farm_id).await {
            Ok(settings) => GridSettingsOutcome::Stored(settings),
            Err(err) => {
                let settings = kind.default_settings(farm_id);
                warn!(grid_type = %settings.grid_type, error = %err, "using default grid settings");
                GridSettingsOutcome::Default {
                    settings,
                    reason: err.to_string(),
                }
            }
        }
    }

    pub async fn save(
        &self,
        kind: GridKind,
        farm_id: Option<i64>,
        rows: i64,
        cols: i64,
    ) -> Result<GridSettings> {
        if rows < 1 || cols < 1 {
            return Err(PersistenceError::ConstraintViolation(format!(
                "grid size must be positive, got {rows}x{cols}"
            )));
        }

        let mut conn = self.gateway.connect().await?;
        let row = conn
            .fetch_optional(
                "INSERT INTO grid_settings (grid_type, rows, cols, updated_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (grid_type) DO UPDATE SET \
                 rows = excluded.rows, cols = excluded.cols, updated_at = excluded.updated_at \
                 RETURNING grid_type, rows, cols",
                &[
                    kind.key(farm_id).into(),
                    rows.into(),
                    cols.into(),
                    Utc::now().to_rfc3339().into(),
                ],
            )
            .await?;
        row.as_ref()
            .map(settings_from_row)
            .transpose()?
            .ok_or_else(|| PersistenceError::Query("upsert returned no row".into()))
    }

    async fn load_or_create(&self, kind: GridKind, farm_id: Option<i64>) -> Result<GridSettings> {
        let key = kind.key(farm_id);
        let mut conn = self.gateway.connect().await?;

        if let Some(row) = conn
            .fetch_optional(
                "SELECT grid_type, rows, cols FROM grid_settings WHERE grid_type = $1",
                &[key.as_str().into()],
            )
            .await?
        {
            return settings_from_row(&row);
        }

        let defaults = kind.default_settings(farm_id);
        conn.execute(
            "INSERT INTO grid_settings (grid_type, rows, cols, updated_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (grid_type) DO NOTHING",
            &[
                key.as_str().into(),
                defaults.rows.into(),
                defaults.cols.into(),
                Utc::now().to_rfc3339().into(),
            ],
        )
        .await?;
        Ok(defaults)
    }
}

fn settings_from_row(row: &AnyRow) -> Result<GridSettings> {
    Ok(GridSettings {
        grid_type: row.try_get("grid_type")?,
        rows: row.try_get("rows")?,
        cols: row.try_get("cols")?,
    })
}
