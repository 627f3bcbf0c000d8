use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::model::chat::{ChatMessage, ChatRole, ChatSession};

/// Chat sessions persisted as one JSON file each.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("sessions"),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            bail!("Invalid session name: {id:?}");
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Load a session, or start an empty one when none is stored yet.
    pub fn load(&self, id: &str) -> Result<ChatSession> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(ChatSession::new(id));
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session {}", path.display()))
    }

    pub fn save(&self, session: &ChatSession) -> Result<()> {
        let path = self.path_for(&session.id)?;
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Append-only log of assistant replies the user chose to keep.
pub struct ResponseLog {
    path: PathBuf,
}

impl ResponseLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("chat_responses.jsonl"),
        }
    }

    pub fn save(&self, message: &ChatMessage) -> Result<()> {
        if message.role != ChatRole::Assistant || message.content.trim().is_empty() {
            bail!("Invalid message format: only non-empty assistant replies can be saved");
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut entry = message.clone();
        entry.timestamp = Some(chrono::Utc::now().to_rfc3339());

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(&entry)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// All saved replies, oldest first. Unreadable lines are skipped.
    pub fn read_all(&self) -> Vec<ChatMessage> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping corrupt saved response");
                    None
                }
            })
            .collect()
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

/// Render messages as a Markdown transcript.
pub fn export_markdown(messages: &[ChatMessage]) -> String {
    let mut out = String::from("# Chat export\n");
    for message in messages {
        let who = match message.role {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
            ChatRole::System => "System",
        };
        out.push_str(&format!("\n## {who}"));
        if let Some(ts) = &message.timestamp {
            out.push_str(&format!(" ({ts})"));
        }
        out.push_str("\n\n");
        out.push_str(message.content.trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        let mut session = store.load("planning").unwrap();
        assert!(session.messages.is_empty());

        session.push(ChatMessage::user("We need SSO"));
        session.push(ChatMessage::assistant("Which providers?"));
        store.save(&session).unwrap();

        let loaded = store.load("planning").unwrap();
        assert_eq!(loaded.id, "planning");
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[1].content, "Which providers?");

        store.delete("planning").unwrap();
        assert!(store.load("planning").unwrap().messages.is_empty());
        store.delete("planning").unwrap();
    }

    #[test]
    fn session_names_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        assert!(store.load("../secrets").is_err());
        assert!(store.load("").is_err());
        assert!(store.load(".hidden").is_err());
    }

    #[test]
    fn response_log_only_accepts_assistant_replies() {
        let dir = tempfile::tempdir().unwrap();
        let log = ResponseLog::new(dir.path());

        assert!(log.save(&ChatMessage::user("hi")).is_err());
        assert!(log.save(&ChatMessage::assistant("   ")).is_err());
        log.save(&ChatMessage::assistant("first")).unwrap();
        log.save(&ChatMessage::assistant("second")).unwrap();

        let saved = log.read_all();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].content, "first");
        assert!(saved[1].timestamp.is_some());
    }

    #[test]
    fn response_log_skips_corrupt_lines_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let log = ResponseLog::new(dir.path());
        assert!(log.read_all().is_empty());
        log.clear().unwrap();

        log.save(&ChatMessage::assistant("kept")).unwrap();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("chat_responses.jsonl"))
            .unwrap();
        writeln!(file, "{{not json").unwrap();

        let saved = log.read_all();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].content, "kept");

        log.clear().unwrap();
        assert!(log.read_all().is_empty());
    }

    #[test]
    fn export_renders_roles_in_order() {
        let messages = vec![
            ChatMessage {
                role: ChatRole::User,
                content: "Add login".into(),
                timestamp: None,
            },
            ChatMessage {
                role: ChatRole::Assistant,
                content: "Email or SSO?\n".into(),
                timestamp: Some("2026-01-01T00:00:00Z".into()),
            },
        ];
        let md = export_markdown(&messages);
        assert_eq!(
            md,
            "# Chat export\n\n## User\n\nAdd login\n\n## Assistant (2026-01-01T00:00:00Z)\n\nEmail or SSO?\n"
        );
    }
}
