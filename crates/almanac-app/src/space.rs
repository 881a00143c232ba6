//! Loading a directory of notes into a space.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use almanac_core::error::AlmanacError;
use almanac_core::types::{Source, SourceType, SpaceId};
use almanac_sources::{NewSource, SourceError, SourceLifecycleManager, SourcePayload};

const EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

fn is_note(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Create one `text` source per note file of `dir`, in file name order.
///
/// Empty files are skipped. Subdirectories are not descended into.
pub async fn load_directory(
    manager: &SourceLifecycleManager,
    space_id: SpaceId,
    dir: &Path,
) -> Result<Vec<Source>, SourceError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(AlmanacError::from)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_note(path))
        .collect();
    paths.sort();

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(&path).map_err(AlmanacError::from)?;
        if content.trim().is_empty() {
            warn!(path = %path.display(), "Skipping empty file");
            continue;
        }
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let source = manager
            .create_source(NewSource {
                space_id,
                name,
                source_type: SourceType::Text,
                payload: SourcePayload::Text(content),
            })
            .await?;
        sources.push(source);
    }

    info!(dir = %dir.display(), sources = sources.len(), "Directory loaded");
    Ok(sources)
}
