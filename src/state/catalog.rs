use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::document::DocumentIdentity;
use crate::error::{BrowserError, Result};

/// The Catalog manages the SQLite database holding everything the browser
/// keeps between runs: preferences and the recents list.
pub struct Catalog {
    conn: Connection,
    db_path: PathBuf,
}

impl Catalog {
    /// Open (or create) the catalog in the user's data directory:
    /// - Linux: ~/.local/share/doc-browser/catalog.db
    /// - macOS: ~/Library/Application Support/doc-browser/catalog.db
    /// - Windows: %APPDATA%\doc-browser\catalog.db
    pub fn open_default() -> Result<Self> {
        Self::open(&Self::default_path()?)
    }

    /// Open (or create) the catalog at `db_path`
    pub fn open(db_path: &Path) -> Result<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!("Catalog opened at: {}", db_path.display());

        let mut catalog = Catalog {
            conn,
            db_path: db_path.to_path_buf(),
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Catalog that lives only as long as the value (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let mut catalog = Catalog {
            conn: Connection::open_in_memory()?,
            db_path: PathBuf::from(":memory:"),
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Where the catalog is stored unless configured otherwise
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| BrowserError::Config("could not determine user data directory".to_string()))?;

        path.push("doc-browser");
        path.push("catalog.db");
        Ok(path)
    }

    /// Create all tables if they don't exist
    fn init_schema(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL
            )",
            [],
        )?;

        // One row per recent document, position 0 is the most recent
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS recents (
                position        INTEGER PRIMARY KEY,
                document_json   TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Store a preference; `None` removes it
    pub fn set_preference(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.conn.execute(
                "INSERT INTO preferences (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?,
            None => self
                .conn
                .execute("DELETE FROM preferences WHERE key = ?1", params![key])?,
        };
        Ok(())
    }

    /// Recents, most recent first. Rows that no longer parse are skipped.
    pub fn load_recents(&self) -> Result<Vec<DocumentIdentity>> {
        let mut stmt = self
            .conn
            .prepare("SELECT document_json FROM recents ORDER BY position ASC")?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut recents = Vec::new();
        for row in rows {
            let json = row?;
            match serde_json::from_str(&json) {
                Ok(document) => recents.push(document),
                Err(err) => warn!("Dropping unreadable recent entry: {err}"),
            }
        }
        Ok(recents)
    }

    /// Replace the stored recents with `recents`
    pub fn save_recents(&mut self, recents: &[DocumentIdentity]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM recents", [])?;
        for (position, document) in recents.iter().enumerate() {
            tx.execute(
                "INSERT INTO recents (position, document_json) VALUES (?1, ?2)",
                params![position as i64, serde_json::to_string(document)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::document::RawItem;

    #[test]
    fn test_preferences_round_trip() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(catalog.get_preference("token").unwrap(), None);

        catalog.set_preference("token", Some("abc")).unwrap();
        catalog.set_preference("token", Some("def")).unwrap();
        assert_eq!(catalog.get_preference("token").unwrap().as_deref(), Some("def"));

        catalog.set_preference("token", None).unwrap();
        assert_eq!(catalog.get_preference("token").unwrap(), None);
    }

    #[test]
    fn test_recents_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        let recents = vec![
            DocumentIdentity::from_raw(&RawItem::new("/d/b.rtf").with_item_id("b")).unwrap(),
            DocumentIdentity::from_raw(&RawItem::new("/d/a.rtf").with_item_id("a")).unwrap(),
        ];
        {
            let mut catalog = Catalog::open(&path).unwrap();
            catalog.save_recents(&recents).unwrap();
            catalog.save_recents(&recents[..1]).unwrap();
            catalog.save_recents(&recents).unwrap();
        }

        let catalog = Catalog::open(&path).unwrap();
        let loaded = catalog.load_recents().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].same_contents(&recents[0]));
        assert!(loaded[1].same_contents(&recents[1]));
    }

    #[test]
    fn test_unreadable_recents_are_skipped() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .conn
            .execute(
                "INSERT INTO recents (position, document_json) VALUES (0, 'not json')",
                [],
            )
            .unwrap();
        assert!(catalog.load_recents().unwrap().is_empty());
    }
}
