use crate::models::knowledge::KnowledgeEntry;
use log::{ info, warn };
use std::fs;
use std::path::{ Path, PathBuf };
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Knowledge JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Knowledge entry {0} not found")]
    NotFound(usize),
    #[error("Invalid knowledge entry: {0}")]
    Invalid(String),
}

/// Ordered question/answer entries backed by a JSON array on disk.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    path: PathBuf,
    entries: Vec<KnowledgeEntry>,
    last_loaded: Option<SystemTime>,
}

impl KnowledgeBase {
    pub fn in_memory(entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            path: PathBuf::new(),
            entries,
            last_loaded: None,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, KnowledgeError> {
        let path = path.as_ref().to_path_buf();
        let entries = read_entries(&path)?;
        info!("Loaded {} knowledge entries from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries,
            last_loaded: Some(SystemTime::now()),
        })
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct topics in first-seen order.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !topics.contains(&entry.topic) {
                topics.push(entry.topic.clone());
            }
        }
        topics
    }

    pub fn reload_if_changed(&mut self) -> Result<bool, KnowledgeError> {
        if self.path.as_os_str().is_empty() {
            return Ok(false);
        }
        let modified = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => {
                return Ok(false);
            }
        };
        if let Some(last_loaded) = self.last_loaded {
            if modified <= last_loaded {
                return Ok(false);
            }
        }

        info!("Knowledge file changed, reloading {}", self.path.display());
        self.entries = read_entries(&self.path)?;
        self.last_loaded = Some(SystemTime::now());
        Ok(true)
    }

    pub fn add(&mut self, entry: KnowledgeEntry) -> Result<usize, KnowledgeError> {
        validate(&entry)?;
        let mut entries = self.entries.clone();
        entries.push(entry);
        self.commit(entries)?;
        Ok(self.entries.len() - 1)
    }

    pub fn update(&mut self, index: usize, entry: KnowledgeEntry) -> Result<(), KnowledgeError> {
        validate(&entry)?;
        let mut entries = self.entries.clone();
        let slot = entries.get_mut(index).ok_or(KnowledgeError::NotFound(index))?;
        *slot = entry;
        self.commit(entries)
    }

    pub fn remove(&mut self, index: usize) -> Result<KnowledgeEntry, KnowledgeError> {
        if index >= self.entries.len() {
            return Err(KnowledgeError::NotFound(index));
        }
        let mut entries = self.entries.clone();
        let removed = entries.remove(index);
        self.commit(entries)?;
        Ok(removed)
    }

    /// Writes `entries` to disk and only then makes them live.
    fn commit(&mut self, entries: Vec<KnowledgeEntry>) -> Result<(), KnowledgeError> {
        if !self.path.as_os_str().is_empty() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string_pretty(&entries)?;
            fs::write(&self.path, json)?;
            self.last_loaded = Some(SystemTime::now());
        }
        self.entries = entries;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Vec<KnowledgeEntry>, KnowledgeError> {
    if !path.exists() {
        warn!("Knowledge file {} not found. Starting with an empty knowledge base.", path.display());
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&text)?)
}

fn validate(entry: &KnowledgeEntry) -> Result<(), KnowledgeError> {
    if entry.question.trim().is_empty() {
        return Err(KnowledgeError::Invalid("question must not be empty".into()));
    }
    if entry.answer.trim().is_empty() {
        return Err(KnowledgeError::Invalid("answer must not be empty".into()));
    }
    Ok(())
}
