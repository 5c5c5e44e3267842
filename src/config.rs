use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::BiokbError;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolves the database location: an explicit `--db` flag wins, then
    /// the config file, then a per-user default. The default config file
    /// (`biokb.json` in the current directory) may be absent; an explicitly
    /// named one may not.
    pub fn resolve(db: Option<&str>, config_path: Option<&str>) -> Result<Utf8PathBuf, BiokbError> {
        if let Some(db) = db {
            return Ok(Utf8PathBuf::from(db));
        }

        let path = match config_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("biokb.json"),
        };

        if !path.exists() {
            if config_path.is_some() {
                return Err(BiokbError::ConfigRead(path));
            }
            return Self::default_database_path();
        }

        let content =
            fs::read_to_string(&path).map_err(|_| BiokbError::ConfigRead(path.clone()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|err| BiokbError::ConfigParse(err.to_string()))?;

        match config.database {
            Some(database) => Ok(Utf8PathBuf::from(database)),
            None => Self::default_database_path(),
        }
    }

    fn default_database_path() -> Result<Utf8PathBuf, BiokbError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".biokb").join("biokb.sqlite")).ok()
            })
            .ok_or_else(|| BiokbError::Filesystem("unable to resolve home directory".to_string()))
    }
}
