use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::data::{StoredEvolution, StoredIdea};

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("an idea with the same fingerprint already exists")]
    DuplicateFingerprint,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Persistence seam for accepted ideas. `save` is the only place duplicate
/// fingerprints are detected; readers never see half-written records because
/// the fingerprint marker is claimed before the record is written.
pub trait IdeaRepository: Send + Sync {
    /// Newest first, at most `limit` entries.
    fn list_recent(&self, limit: usize) -> Result<Vec<StoredIdea>>;
    fn load(&self, id: &Uuid) -> Result<StoredIdea>;
    fn save(&self, idea: &StoredIdea) -> Result<Uuid, SaveError>;
    fn save_evolution(&self, evolution: &StoredEvolution) -> Result<Uuid>;
    /// Oldest first, so phase numbering is stable.
    fn list_evolutions(&self, project_id: &Uuid) -> Result<Vec<StoredEvolution>>;
}

pub struct FileRepository {
    base_dir: PathBuf,
}

impl FileRepository {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn ideas_dir(&self) -> PathBuf {
        self.base_dir.join("ideas")
    }

    fn idea_path(&self, id: &Uuid) -> PathBuf {
        self.ideas_dir().join(format!("{id}.json"))
    }

    fn fingerprint_path(&self, fingerprint: &str) -> PathBuf {
        self.base_dir.join("by-fingerprint").join(fingerprint)
    }

    fn evolutions_dir(&self, project_id: &Uuid) -> PathBuf {
        self.base_dir.join("evolutions").join(project_id.to_string())
    }
}

impl IdeaRepository for FileRepository {
    fn list_recent(&self, limit: usize) -> Result<Vec<StoredIdea>> {
        let dir = self.ideas_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ideas = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {dir:?}"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read idea: {path:?}"))?;
            let idea: StoredIdea = serde_json::from_str(&content)
                .with_context(|| format!("Corrupt idea record: {path:?}"))?;
            ideas.push(idea);
        }

        ideas.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        ideas.truncate(limit);
        Ok(ideas)
    }

    fn load(&self, id: &Uuid) -> Result<StoredIdea> {
        let path = self.idea_path(id);
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read idea: {path:?}"))?;
        let idea: StoredIdea = serde_json::from_str(&content)?;
        Ok(idea)
    }

    fn save(&self, idea: &StoredIdea) -> Result<Uuid, SaveError> {
        fs::create_dir_all(self.ideas_dir())?;
        let marker_path = self.fingerprint_path(&idea.fingerprint);
        if let Some(parent) = marker_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // create_new makes the fingerprint claim atomic: whoever creates the
        // marker owns the record, everyone else gets DuplicateFingerprint.
        let mut marker = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&marker_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SaveError::DuplicateFingerprint);
            }
            Err(e) => return Err(SaveError::Io(e)),
        };
        marker.write_all(idea.id.to_string().as_bytes())?;

        let json = serde_json::to_string_pretty(idea)?;
        fs::write(self.idea_path(&idea.id), json)?;
        Ok(idea.id)
    }

    fn save_evolution(&self, evolution: &StoredEvolution) -> Result<Uuid> {
        let dir = self.evolutions_dir(&evolution.project_id);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {dir:?}"))?;
        let path = dir.join(format!("{}.json", evolution.id));
        let json = serde_json::to_string_pretty(evolution)?;
        fs::write(&path, json).with_context(|| format!("Failed to write evolution: {path:?}"))?;
        Ok(evolution.id)
    }

    fn list_evolutions(&self, project_id: &Uuid) -> Result<Vec<StoredEvolution>> {
        let dir = self.evolutions_dir(project_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut evolutions = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {dir:?}"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read evolution: {path:?}"))?;
            let evolution: StoredEvolution = serde_json::from_str(&content)
                .with_context(|| format!("Corrupt evolution record: {path:?}"))?;
            evolutions.push(evolution);
        }

        evolutions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(evolutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::sample_stored_idea;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        let idea = sample_stored_idea("fp-1");
        let id = repo.save(&idea).unwrap();
        assert_eq!(id, idea.id);

        let loaded = repo.load(&id).unwrap();
        assert_eq!(loaded.overview, idea.overview);
        assert_eq!(loaded.fingerprint, "fp-1");
    }

    #[test]
    fn test_duplicate_fingerprint_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        repo.save(&sample_stored_idea("fp-dup")).unwrap();
        let err = repo.save(&sample_stored_idea("fp-dup")).unwrap_err();
        assert!(matches!(err, SaveError::DuplicateFingerprint));
    }

    #[test]
    fn test_list_recent_is_newest_first_and_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        for i in 0..5i64 {
            let mut idea = sample_stored_idea(&format!("fp-{i}"));
            idea.created_at = idea.created_at - Duration::minutes(5 - i);
            idea.overview = format!("idea {i}");
            repo.save(&idea).unwrap();
        }

        let recent = repo.list_recent(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].overview, "idea 4");
        assert_eq!(recent[1].overview, "idea 3");
        assert_eq!(recent[2].overview, "idea 2");
    }

    fn stored_evolution(project_id: Uuid, minutes_ago: i64) -> StoredEvolution {
        StoredEvolution {
            id: Uuid::new_v4(),
            project_id,
            created_at: chrono::Utc::now() - Duration::minutes(minutes_ago),
            provider_used: "gemini".into(),
            fallback_used: false,
            provider_error: None,
            latency_ms: 900,
            raw_json: "{}".into(),
        }
    }

    #[test]
    fn test_evolutions_listed_oldest_first_per_project() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path());

        let project_id = Uuid::new_v4();
        let newer = stored_evolution(project_id, 1);
        let older = stored_evolution(project_id, 10);
        repo.save_evolution(&newer).unwrap();
        repo.save_evolution(&older).unwrap();
        repo.save_evolution(&stored_evolution(Uuid::new_v4(), 5))
            .unwrap();

        let listed = repo.list_evolutions(&project_id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);
    }

    #[test]
    fn test_list_evolutions_for_unknown_project_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path());
        assert!(repo.list_evolutions(&Uuid::new_v4()).unwrap().is_empty());
    }

    #[test]
    fn test_list_recent_on_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let repo = FileRepository::new(temp_dir.path());
        assert!(repo.list_recent(10).unwrap().is_empty());
    }
}
