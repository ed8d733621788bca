pub mod api;
pub mod memory;
pub mod source;
pub mod target;

pub use api::ApiTarget;
pub use memory::MemoryTarget;
pub use source::SourceSnapshot;
pub use target::{ActionResponse, DowntimeRequest, Filter, ObjectType, Query, TargetStore};

use crate::config::TargetSettings;
use crate::error::{MigrateError, Result};

/// Open the target configured for this run: an offline snapshot when one is
/// given, otherwise the live API.
pub fn open_target(settings: &TargetSettings) -> Result<Box<dyn TargetStore>> {
    if let Some(path) = &settings.snapshot {
        return Ok(Box::new(MemoryTarget::from_file(path)?));
    }
    if settings.url.is_some() {
        return Ok(Box::new(ApiTarget::new(settings)?));
    }
    Err(MigrateError::Config(
        "no target configured: set target.url or target.snapshot".into(),
    ))
}
