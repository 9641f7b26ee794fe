//! Transport-agnostic control surface for the scheduler and remapper.
//!
//! Every call returns a [`ControlResponse`], which an outer web layer can
//! serialize as-is: `{"success": true, "data": ...}` or
//! `{"success": false, "error": "..."}`. A failed job run also carries the
//! run record in `data`.

use crate::remap::{RemapRequest, Remapper};
use crate::scheduler::Scheduler;
use serde::Serialize;
use serde_json::{Value as Json, json};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self::err(format!("failed to encode response: {err}")),
        }
    }

    pub fn err(message: impl fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.to_string()),
        }
    }

    /// Failure that still has something to show
    pub fn failed(message: impl fmt::Display, data: impl Serialize) -> Self {
        Self {
            data: serde_json::to_value(data).ok(),
            ..Self::err(message)
        }
    }

    pub fn to_json(&self) -> Json {
        let mut object = serde_json::Map::new();
        object.insert("success".into(), Json::Bool(self.success));
        if let Some(data) = &self.data {
            object.insert("data".into(), data.clone());
        }
        if let Some(error) = &self.error {
            object.insert("error".into(), Json::String(error.clone()));
        }
        Json::Object(object)
    }
}

/// Entry points exposed to the outer layer
#[derive(Clone)]
pub struct ControlSurface {
    scheduler: Scheduler,
    remapper: Option<Remapper>,
}

impl ControlSurface {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            remapper: None,
        }
    }

    pub fn with_remapper(mut self, remapper: Remapper) -> Self {
        self.remapper = Some(remapper);
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub async fn status(&self) -> ControlResponse {
        ControlResponse::ok(self.scheduler.status().await)
    }

    /// Trigger the job immediately
    ///
    /// A failed run is reported as `success: false` with the failure detail,
    /// and the run record under `data.run`.
    pub async fn run_now(&self) -> ControlResponse {
        match self.scheduler.run_now().await {
            Ok(run) if run.succeeded() => ControlResponse::ok(json!({
                "message": format!("{} trees updated", run.rows_affected),
                "run": run,
            })),
            Ok(run) => {
                let detail = run
                    .error_detail
                    .clone()
                    .unwrap_or_else(|| "job run failed".to_string());
                ControlResponse::failed(detail, json!({ "run": run }))
            }
            Err(err) => {
                warn!(error = %err, "manual run rejected");
                ControlResponse::err(err)
            }
        }
    }

    pub async fn start(&self) -> ControlResponse {
        let message = if self.scheduler.start().await {
            "scheduler started"
        } else {
            "scheduler already running"
        };
        ControlResponse::ok(json!({
            "message": message,
            "status": self.scheduler.status().await,
        }))
    }

    pub async fn stop(&self) -> ControlResponse {
        let message = if self.scheduler.stop().await {
            "scheduler stopped"
        } else {
            "scheduler was not running"
        };
        ControlResponse::ok(json!({
            "message": message,
            "status": self.scheduler.status().await,
        }))
    }

    pub async fn history(&self) -> ControlResponse {
        ControlResponse::ok(self.scheduler.history().await)
    }

    pub async fn remap(&self, request: &RemapRequest) -> ControlResponse {
        let Some(remapper) = &self.remapper else {
            return ControlResponse::err("remapping is not configured");
        };
        match remapper.remap(request).await {
            Ok(outcome) => ControlResponse::ok(outcome),
            Err(err) => ControlResponse::err(err),
        }
    }
}
