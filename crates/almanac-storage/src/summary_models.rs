//! Summary model records and default resolution.

use almanac_core::error::{AlmanacError, Result};
use almanac_core::types::{SpaceId, SummaryConfig, SummaryModel, SummaryModelId};

use crate::store::{read, write, RecordStore};

impl RecordStore {
    /// Insert a summary model. A model flagged as default demotes the
    /// previous default of its space.
    pub fn insert_summary_model(&self, model: SummaryModel) -> Result<()> {
        let mut models = write(&self.summary_models, "summary_models")?;
        if model.is_default {
            for other in models.values_mut() {
                if other.space_id == model.space_id {
                    other.is_default = false;
                }
            }
        }
        models.insert(model.id, model);
        Ok(())
    }

    pub fn get_summary_model(&self, id: SummaryModelId) -> Result<SummaryModel> {
        let models = read(&self.summary_models, "summary_models")?;
        models
            .get(&id)
            .cloned()
            .ok_or_else(|| AlmanacError::not_found("summary model", id))
    }

    /// Replace the configuration of a model.
    ///
    /// Summaries generated earlier keep the snapshot they were built with.
    pub fn replace_summary_config(
        &self,
        id: SummaryModelId,
        config: SummaryConfig,
    ) -> Result<SummaryModel> {
        let mut models = write(&self.summary_models, "summary_models")?;
        let model = models
            .get_mut(&id)
            .ok_or_else(|| AlmanacError::not_found("summary model", id))?;
        model.config = config;
        Ok(model.clone())
    }

    /// Models usable from a space: its own plus every shared one.
    pub fn list_summary_models(&self, space_id: SpaceId) -> Result<Vec<SummaryModel>> {
        let models = read(&self.summary_models, "summary_models")?;
        let mut result: Vec<SummaryModel> = models
            .values()
            .filter(|m| m.space_id == space_id || m.is_shared)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    /// Resolve the default model of a space.
    ///
    /// The space's own default wins, then the oldest shared default.
    /// `None` means the built-in configuration applies.
    pub fn default_summary_model(&self, space_id: SpaceId) -> Result<Option<SummaryModel>> {
        let candidates = self.list_summary_models(space_id)?;
        let own = candidates
            .iter()
            .find(|m| m.is_default && m.space_id == space_id);
        if let Some(model) = own {
            return Ok(Some(model.clone()));
        }
        Ok(candidates.into_iter().find(|m| m.is_default && m.is_shared))
    }

    pub fn remove_space_summary_models(&self, space_id: SpaceId) -> Result<usize> {
        let mut models = write(&self.summary_models, "summary_models")?;
        let before = models.len();
        models.retain(|_, m| m.space_id != space_id);
        Ok(before - models.len())
    }
}
