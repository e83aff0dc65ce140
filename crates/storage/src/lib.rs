//! Sqlite-backed client settings.

use std::path::Path;

use anyhow::Context as _;
use libreria_core::{Settings, Theme};
use rusqlite::{Connection, OptionalExtension as _};

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                api_url TEXT NOT NULL
            );
            INSERT OR IGNORE INTO settings (id, api_url)
            VALUES (1, 'http://localhost:8001');
            "#,
        )?;

        self.add_column("download_dir", "TEXT NOT NULL DEFAULT ''")?;
        self.add_column("theme", "TEXT NOT NULL DEFAULT 'dark'")?;
        Ok(())
    }

    fn add_column(&self, name: &str, decl: &str) -> anyhow::Result<()> {
        let sql = format!("ALTER TABLE settings ADD COLUMN {name} {decl}");
        match self.conn.execute(&sql, []) {
            Ok(_) => Ok(()),
            Err(err) => {
                let msg = err.to_string();
                if msg.contains("duplicate column name") {
                    Ok(())
                } else {
                    Err(err).with_context(|| format!("add settings.{name} column"))
                }
            }
        }
    }

    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let row = self
            .conn
            .query_row(
                "SELECT api_url, download_dir, theme FROM settings WHERE id = 1",
                [],
                |row| {
                    let api_url: String = row.get(0)?;
                    let download_dir: String = row.get(1)?;
                    let theme: String = row.get(2)?;
                    Ok((api_url, download_dir, theme))
                },
            )
            .optional()?;

        let Some((api_url, download_dir, theme)) = row else {
            return Ok(Settings::default());
        };

        let mut settings = Settings {
            api_url,
            download_dir,
            theme: theme.parse::<Theme>().unwrap_or(Theme::Dark),
        };
        settings.normalize();
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut settings = settings.clone();
        settings.normalize();

        self.conn.execute(
            "UPDATE settings SET api_url = ?, download_dir = ?, theme = ? WHERE id = 1",
            (
                &settings.api_url,
                &settings.download_dir,
                settings.theme.as_str(),
            ),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use libreria_core::DEFAULT_API_URL;

    use super::*;

    fn open_in_memory() -> anyhow::Result<Storage> {
        let conn = Connection::open_in_memory()?;
        let storage = Storage { conn };
        storage.migrate()?;
        Ok(storage)
    }

    #[test]
    fn defaults_on_fresh_db() -> anyhow::Result<()> {
        let storage = open_in_memory()?;
        let settings = storage.load_settings()?;
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.download_dir, "");
        assert_eq!(settings.theme, Theme::Dark);
        Ok(())
    }

    #[test]
    fn settings_roundtrip() -> anyhow::Result<()> {
        let storage = open_in_memory()?;
        let mut settings = storage.load_settings()?;
        settings.api_url = "http://nas.local:8001/".to_string();
        settings.download_dir = "/home/ana/Descargas".to_string();
        settings.cycle_theme();
        storage.save_settings(&settings)?;

        let loaded = storage.load_settings()?;
        assert_eq!(loaded.api_url, "http://nas.local:8001");
        assert_eq!(loaded.download_dir, "/home/ana/Descargas");
        assert_eq!(loaded.theme, Theme::Light);
        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> anyhow::Result<()> {
        let storage = open_in_memory()?;
        storage.migrate()?;
        storage.migrate()?;
        assert_eq!(storage.load_settings()?, Settings::default());
        Ok(())
    }

    #[test]
    fn unknown_theme_falls_back() -> anyhow::Result<()> {
        let storage = open_in_memory()?;
        storage
            .conn
            .execute("UPDATE settings SET theme = 'sepia' WHERE id = 1", [])?;
        assert_eq!(storage.load_settings()?.theme, Theme::Dark);
        Ok(())
    }

    #[test]
    fn open_creates_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("libreria.db");
        {
            let storage = Storage::open(&path)?;
            let mut settings = storage.load_settings()?;
            settings.download_dir = "/tmp/libros".to_string();
            storage.save_settings(&settings)?;
        }
        let storage = Storage::open(&path)?;
        assert_eq!(storage.load_settings()?.download_dir, "/tmp/libros");
        Ok(())
    }
}
