use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WeaveResult;

use super::Session;

/// A directory of JSONL session logs.
pub struct SessionStore {
    base_dir: PathBuf,
}

/// One log file in a [`SessionStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIndex {
    pub id: String,
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl SessionStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{session_id}.jsonl"))
    }

    /// All logs, oldest first.
    pub async fn list(&self) -> WeaveResult<Vec<SessionIndex>> {
        let mut sessions = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            sessions.push(SessionIndex {
                id,
                modified_at: DateTime::<Utc>::from(metadata.modified()?),
                size_bytes: metadata.len(),
                path,
            });
        }
        sessions.sort_by(|a, b| a.modified_at.cmp(&b.modified_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    /// The most recently written log, for resuming.
    pub async fn most_recent(&self) -> WeaveResult<Option<SessionIndex>> {
        Ok(self.list().await?.pop())
    }

    /// First free `chat{n}.jsonl`, counting from 0.
    pub async fn new_session_path(&self) -> WeaveResult<PathBuf> {
        let mut n = 0;
        loop {
            let path = self.session_path(&format!("chat{n}"));
            if !tokio::fs::try_exists(&path).await? {
                return Ok(path);
            }
            n += 1;
        }
    }

    pub async fn create(&self) -> WeaveResult<Session> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        Session::create(self.new_session_path().await?)
    }

    pub async fn open(&self, session_id: &str) -> WeaveResult<Session> {
        Session::load(self.session_path(session_id)).await
    }

    /// Resume the most recent session, or start a new one.
    pub async fn resume_or_create(&self) -> WeaveResult<Session> {
        match self.most_recent().await? {
            Some(index) => Session::load(&index.path).await,
            None => self.create().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::NewAgent;

    #[tokio::test]
    async fn empty_or_missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("missing"));
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.most_recent().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn new_paths_skip_existing_chats() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert_eq!(store.new_session_path().await.unwrap(), dir.path().join("chat0.jsonl"));
        std::fs::write(dir.path().join("chat0.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert_eq!(store.new_session_path().await.unwrap(), dir.path().join("chat1.jsonl"));

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "chat0");
    }

    #[tokio::test]
    async fn resume_picks_up_existing_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        {
            let mut session = store.resume_or_create().await.unwrap();
            assert_eq!(session.id(), "chat0");
            session
                .create_agent(NewAgent::interlocutor("primary", "m"))
                .unwrap();
        }
        let session = store.resume_or_create().await.unwrap();
        assert_eq!(session.id(), "chat0");
        assert_eq!(session.agents().len(), 1);
        assert!(session.interlocutor().is_some());

        let opened = store.open("chat0").await.unwrap();
        assert_eq!(opened.agents().len(), 1);
    }
}
