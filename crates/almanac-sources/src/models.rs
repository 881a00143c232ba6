//! Summary model registry.

use tracing::info;

use almanac_core::types::{
    SpaceId, SummaryConfig, SummaryModel, SummaryModelId, SummaryModelRef, Timestamp,
};

use crate::error::SourceError;
use crate::manager::SourceLifecycleManager;

#[derive(Debug, Clone)]
pub struct NewSummaryModel {
    pub space_id: SpaceId,
    pub name: String,
    pub config: SummaryConfig,
    /// Becomes the space default, demoting the previous one.
    pub is_default: bool,
    /// Usable from every space.
    pub is_shared: bool,
}

impl SourceLifecycleManager {
    pub fn create_summary_model(&self, new: NewSummaryModel) -> Result<SummaryModel, SourceError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(SourceError::Invalid("summary model name is empty".to_string()));
        }
        let model = SummaryModel {
            id: SummaryModelId::new(),
            space_id: new.space_id,
            name: name.to_string(),
            config: new.config,
            is_default: new.is_default,
            is_shared: new.is_shared,
            created_at: Timestamp::now(),
        };
        self.store.insert_summary_model(model.clone())?;
        info!(model_id = %model.id, space_id = %model.space_id, default = model.is_default, "Summary model created");
        Ok(model)
    }

    /// Replace a model's configuration. Existing summaries keep the
    /// snapshot they were generated with.
    pub fn update_summary_model(
        &self,
        id: SummaryModelId,
        config: SummaryConfig,
    ) -> Result<SummaryModel, SourceError> {
        Ok(self.store.replace_summary_config(id, config)?)
    }

    /// Models usable from a space, shared ones included.
    pub fn list_summary_models(&self, space_id: SpaceId) -> Result<Vec<SummaryModel>, SourceError> {
        Ok(self.store.list_summary_models(space_id)?)
    }

    /// The configuration a summary in this space is generated with.
    ///
    /// An explicit model must belong to the space or be shared. Without
    /// one, the space default applies, then the built-in configuration.
    pub fn resolve_summary_model(
        &self,
        space_id: SpaceId,
        requested: Option<SummaryModelId>,
    ) -> Result<SummaryModelRef, SourceError> {
        match requested {
            Some(id) => {
                let model = self.store.get_summary_model(id)?;
                if model.space_id != space_id && !model.is_shared {
                    return Err(SourceError::Invalid(format!(
                        "summary model {} is not available in space {}",
                        id, space_id
                    )));
                }
                Ok(model.snapshot())
            }
            None => Ok(self
                .store
                .default_summary_model(space_id)?
                .map(|m| m.snapshot())
                .unwrap_or_else(SummaryModelRef::builtin)),
        }
    }
}
