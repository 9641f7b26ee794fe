pub mod runs;
pub mod settings;
pub mod trees;

pub use runs::RunLog;
pub use settings::{GridKind, GridSettings, GridSettingsOutcome, GridSettingsStore};
pub use trees::TreeRepository;
