//! Notes the generator reads from and inserts image references into.

use crate::storage::write_atomic_async;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Zero-based cursor position (line, character) inside a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    pub line: usize,
    pub ch: usize,
}

impl FromStr for CursorPosition {
    type Err = Error;

    /// Parses the one-based `LINE[:COL]` form used on the command line.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::invalid_field("cursor", format!("'{}' is not LINE[:COL]", s));
        let (line, col) = match s.split_once(':') {
            Some((line, col)) => (line, Some(col)),
            None => (s, None),
        };
        let line: usize = line.trim().parse().map_err(|_| invalid())?;
        let col: usize = match col {
            Some(col) => col.trim().parse().map_err(|_| invalid())?,
            None => 1,
        };
        if line == 0 || col == 0 {
            return Err(invalid());
        }
        Ok(Self {
            line: line - 1,
            ch: col - 1,
        })
    }
}

/// The active document as seen by the orchestrator.
#[async_trait]
pub trait Document: Send {
    fn content(&self) -> String;

    /// Insert `text` at the cursor. On error the document is unchanged.
    async fn insert_at_cursor(&mut self, text: &str) -> Result<()>;
}

/// A Markdown note on disk with a cursor.
#[derive(Debug, Clone)]
pub struct MarkdownNote {
    path: PathBuf,
    text: String,
    cursor: CursorPosition,
}

impl MarkdownNote {
    /// Open a note; without a cursor, insertion happens at the end.
    pub fn open(path: &Path, cursor: Option<CursorPosition>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cursor = cursor.unwrap_or_else(|| end_of(&text));
        Ok(Self {
            path: path.to_path_buf(),
            text,
            cursor,
        })
    }

    pub fn from_text(path: PathBuf, text: String, cursor: CursorPosition) -> Self {
        Self { path, text, cursor }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> CursorPosition {
        self.cursor
    }

    async fn write(&self, text: &str) -> Result<()> {
        write_atomic_async(self.path.clone(), text.as_bytes().to_vec()).await?;
        info!("Saved note {}", self.path.display());
        Ok(())
    }

    /// Byte offset of the cursor, clamped to the end of its line / the note.
    fn cursor_offset(&self) -> usize {
        let mut offset = 0;
        for (index, line) in self.text.split_inclusive('\n').enumerate() {
            let content = line.strip_suffix('\n').unwrap_or(line);
            let content = content.strip_suffix('\r').unwrap_or(content);
            if index == self.cursor.line {
                let within = content
                    .char_indices()
                    .nth(self.cursor.ch)
                    .map(|(byte, _)| byte)
                    .unwrap_or(content.len());
                return offset + within;
            }
            offset += line.len();
        }
        self.text.len()
    }
}

#[async_trait]
impl Document for MarkdownNote {
    fn content(&self) -> String {
        self.text.clone()
    }

    async fn insert_at_cursor(&mut self, text: &str) -> Result<()> {
        let mut updated = self.text.clone();
        updated.insert_str(self.cursor_offset(), text);
        self.write(&updated).await?;
        self.text = updated;
        Ok(())
    }
}

fn end_of(text: &str) -> CursorPosition {
    let line = text.matches('\n').count();
    let ch = text.rsplit('\n').next().map_or(0, |last| last.chars().count());
    CursorPosition { line, ch }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_cursor_parsing_is_one_based() {
        assert_eq!(
            "3:5".parse::<CursorPosition>().unwrap(),
            CursorPosition { line: 2, ch: 4 }
        );
        assert_eq!(
            "1".parse::<CursorPosition>().unwrap(),
            CursorPosition { line: 0, ch: 0 }
        );
        assert!("0:1".parse::<CursorPosition>().is_err());
        assert!("x".parse::<CursorPosition>().is_err());
    }

    #[tokio::test]
    async fn test_insert_at_cursor_in_middle_of_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.md");
        let mut note = MarkdownNote::from_text(
            path.clone(),
            "first line\nsecond line\n".to_string(),
            CursorPosition { line: 1, ch: 7 },
        );

        note.insert_at_cursor("[x] ").await.unwrap();

        assert_eq!(note.text(), "first line\nsecond [x] line\n");
        assert_eq!(std::fs::read_to_string(path).unwrap(), note.text());
    }

    #[tokio::test]
    async fn test_cursor_past_end_clamps() {
        let dir = tempdir().unwrap();
        let mut note = MarkdownNote::from_text(
            dir.path().join("note.md"),
            "short\n".to_string(),
            CursorPosition { line: 0, ch: 99 },
        );
        note.insert_at_cursor("!").await.unwrap();
        assert_eq!(note.text(), "short!\n");

        let mut note = MarkdownNote::from_text(
            dir.path().join("other.md"),
            "one\n".to_string(),
            CursorPosition { line: 10, ch: 0 },
        );
        note.insert_at_cursor("two\n").await.unwrap();
        assert_eq!(note.text(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_open_without_cursor_appends_at_end() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "The sun sets over a quiet lake.\n").unwrap();

        let mut note = MarkdownNote::open(&path, None).unwrap();
        assert_eq!(note.cursor(), CursorPosition { line: 1, ch: 0 });

        note.insert_at_cursor("![img](a.png)\n").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "The sun sets over a quiet lake.\n![img](a.png)\n"
        );
    }

    #[tokio::test]
    async fn test_multibyte_characters_use_char_columns() {
        let dir = tempdir().unwrap();
        let mut note = MarkdownNote::from_text(
            dir.path().join("note.md"),
            "héllo".to_string(),
            CursorPosition { line: 0, ch: 2 },
        );
        note.insert_at_cursor("|").await.unwrap();
        assert_eq!(note.text(), "hé|llo");
    }

    #[tokio::test]
    async fn test_failed_save_leaves_note_unchanged() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("folder");
        std::fs::write(&blocker, "plain file").unwrap();
        let mut note = MarkdownNote::from_text(
            blocker.join("note.md"),
            "original\n".to_string(),
            CursorPosition { line: 1, ch: 0 },
        );

        let result = note.insert_at_cursor("![Generated Image](x.webp)\n").await;

        assert!(result.is_err());
        assert_eq!(note.text(), "original\n");
        assert_eq!(note.content(), "original\n");
    }
}
