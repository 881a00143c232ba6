//! Source records.

use almanac_core::error::{AlmanacError, Result};
use almanac_core::types::{Source, SourceId, SpaceId};

use crate::store::{read, write, RecordStore};

impl RecordStore {
    /// Insert a new source. Fails if the id is already taken.
    pub fn insert_source(&self, source: Source) -> Result<()> {
        let mut sources = write(&self.sources, "sources")?;
        if sources.contains_key(&source.id) {
            return Err(AlmanacError::Storage(format!(
                "source {} already exists",
                source.id
            )));
        }
        sources.insert(source.id, source);
        Ok(())
    }

    pub fn get_source(&self, id: SourceId) -> Result<Source> {
        let sources = read(&self.sources, "sources")?;
        sources
            .get(&id)
            .cloned()
            .ok_or_else(|| AlmanacError::not_found("source", id))
    }

    /// Apply `f` to a source under the write lock.
    ///
    /// The closure sees the current record and either mutates it or returns
    /// an error, in which case the record is left untouched.
    pub fn update_source<T, F>(&self, id: SourceId, f: F) -> Result<T>
    where
        F: FnOnce(&mut Source) -> Result<T>,
    {
        let mut sources = write(&self.sources, "sources")?;
        let current = sources
            .get(&id)
            .ok_or_else(|| AlmanacError::not_found("source", id))?;
        let mut draft = current.clone();
        let out = f(&mut draft)?;
        sources.insert(id, draft);
        Ok(out)
    }

    /// Sources of a space, oldest first.
    pub fn list_sources(&self, space_id: SpaceId) -> Result<Vec<Source>> {
        let sources = read(&self.sources, "sources")?;
        let mut result: Vec<Source> = sources
            .values()
            .filter(|s| s.space_id == space_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    /// Sources of every space with a transcription job outstanding.
    pub fn in_flight_sources(&self) -> Result<Vec<Source>> {
        let sources = read(&self.sources, "sources")?;
        Ok(sources
            .values()
            .filter(|s| s.transcription_status.is_in_flight())
            .cloned()
            .collect())
    }

    pub fn remove_source(&self, id: SourceId) -> Result<Source> {
        let mut sources = write(&self.sources, "sources")?;
        sources
            .remove(&id)
            .ok_or_else(|| AlmanacError::not_found("source", id))
    }

    /// Remove every source of a space and return their ids.
    pub fn remove_space_sources(&self, space_id: SpaceId) -> Result<Vec<SourceId>> {
        let mut sources = write(&self.sources, "sources")?;
        let ids: Vec<SourceId> = sources
            .values()
            .filter(|s| s.space_id == space_id)
            .map(|s| s.id)
            .collect();
        for id in &ids {
            sources.remove(id);
        }
        tracing::debug!(space_id = %space_id, removed = ids.len(), "Space sources removed");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_core::types::{SourceType, Timestamp, TranscriptionStatus};

    fn make_source(space_id: SpaceId, name: &str, created_at: i64) -> Source {
        Source {
            id: SourceId::new(),
            space_id,
            name: name.to_string(),
            source_type: SourceType::Text,
            content: Some(format!("content of {}", name)),
            summary: None,
            summary_model_ref: None,
            summary_tokens: None,
            transcription_status: TranscriptionStatus::None,
            transcription_provider: None,
            transcription_job_id: None,
            transcription_submitted_at: None,
            duration_seconds: None,
            speakers: vec![],
            file: None,
            created_at: Timestamp(created_at),
            updated_at: Timestamp(created_at),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = RecordStore::new();
        let source = make_source(SpaceId::new(), "a", 1);
        let id = source.id;
        store.insert_source(source).unwrap();
        assert_eq!(store.get_source(id).unwrap().name, "a");
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let store = RecordStore::new();
        let source = make_source(SpaceId::new(), "a", 1);
        store.insert_source(source.clone()).unwrap();
        assert!(store.insert_source(source).is_err());
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = RecordStore::new();
        let err = store.get_source(SourceId::new()).unwrap_err();
        assert!(matches!(err, AlmanacError::NotFound { kind: "source", .. }));
    }

    #[test]
    fn test_update_source_applies_changes() {
        let store = RecordStore::new();
        let source = make_source(SpaceId::new(), "a", 1);
        let id = source.id;
        store.insert_source(source).unwrap();

        let len = store
            .update_source(id, |s| {
                s.summary = Some("summary".to_string());
                Ok(s.summary.as_ref().map(|x| x.len()))
            })
            .unwrap();
        assert_eq!(len, Some(7));
        assert_eq!(store.get_source(id).unwrap().summary.as_deref(), Some("summary"));
    }

    #[test]
    fn test_update_source_error_leaves_record_untouched() {
        let store = RecordStore::new();
        let source = make_source(SpaceId::new(), "a", 1);
        let id = source.id;
        store.insert_source(source).unwrap();

        let result: Result<()> = store.update_source(id, |s| {
            s.name = "changed".to_string();
            Err(AlmanacError::Validation("rejected".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.get_source(id).unwrap().name, "a");
    }

    #[test]
    fn test_list_sources_scoped_and_ordered() {
        let store = RecordStore::new();
        let space = SpaceId::new();
        store.insert_source(make_source(space, "second", 20)).unwrap();
        store.insert_source(make_source(space, "first", 10)).unwrap();
        store.insert_source(make_source(SpaceId::new(), "other", 5)).unwrap();

        let names: Vec<String> = store
            .list_sources(space)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_in_flight_sources_across_spaces() {
        let store = RecordStore::new();
        let mut pending = make_source(SpaceId::new(), "pending", 1);
        pending.content = None;
        pending.transcription_status = TranscriptionStatus::Pending;
        let mut processing = make_source(SpaceId::new(), "processing", 2);
        processing.content = None;
        processing.transcription_status = TranscriptionStatus::Processing;
        store.insert_source(pending).unwrap();
        store.insert_source(processing).unwrap();
        store.insert_source(make_source(SpaceId::new(), "text", 3)).unwrap();

        assert_eq!(store.in_flight_sources().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_space_sources() {
        let store = RecordStore::new();
        let space = SpaceId::new();
        let keep = make_source(SpaceId::new(), "keep", 1);
        let keep_id = keep.id;
        store.insert_source(make_source(space, "a", 1)).unwrap();
        store.insert_source(make_source(space, "b", 2)).unwrap();
        store.insert_source(keep).unwrap();

        let removed = store.remove_space_sources(space).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(store.list_sources(space).unwrap().is_empty());
        assert!(store.get_source(keep_id).is_ok());
    }
}
