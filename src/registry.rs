//! Versioned model registry: SQLite metadata plus JSON model artifacts.
//!
//! Layout under the registry root:
//! - `registry.sqlite`: one row per (name, version) with params and metrics
//! - `artifacts/<name>/<version>/model.json`: the serialized model

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::model::{BucketMeanModel, EvaluationMetrics};

const DB_FILE: &str = "registry.sqlite";
const ARTIFACT_FILE: &str = "model.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model {name} version {version} is not registered")]
    NotFound { name: String, version: i64 },
    #[error("invalid model name '{0}'")]
    InvalidName(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredModel {
    pub name: String,
    pub version: i64,
    pub params: BTreeMap<String, String>,
    pub metrics: EvaluationMetrics,
    pub artifact_path: PathBuf,
    pub created_at_utc: String,
}

pub struct ModelRegistry {
    root: PathBuf,
    conn: Connection,
}

impl ModelRegistry {
    pub fn open(root: &Path) -> Result<Self, RegistryError> {
        fs::create_dir_all(root)?;
        let conn = Connection::open(root.join(DB_FILE))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS model_versions (
                name TEXT NOT NULL,
                version INTEGER NOT NULL,
                params_json TEXT NOT NULL,
                metrics_json TEXT NOT NULL,
                artifact_path TEXT NOT NULL,
                created_at_utc TEXT NOT NULL,
                PRIMARY KEY (name, version)
            );
            ",
        )?;

        Ok(Self {
            root: root.to_path_buf(),
            conn,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores `model` as the next version of `name`, starting at 1.
    pub fn register(
        &mut self,
        name: &str,
        model: &BucketMeanModel,
        params: &BTreeMap<String, String>,
        metrics: &EvaluationMetrics,
    ) -> Result<i64, RegistryError> {
        validate_name(name)?;

        let tx = self.conn.transaction()?;
        let current: Option<i64> = tx.query_row(
            "SELECT MAX(version) FROM model_versions WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        let version = current.unwrap_or(0) + 1;

        let relative = PathBuf::from("artifacts")
            .join(name)
            .join(version.to_string())
            .join(ARTIFACT_FILE);
        let artifact_path = self.root.join(&relative);
        let artifact = serde_json::to_vec_pretty(model)?;

        tx.execute(
            "
            INSERT INTO model_versions
                (name, version, params_json, metrics_json, artifact_path, created_at_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                name,
                version,
                serde_json::to_string(params)?,
                serde_json::to_string(metrics)?,
                relative.to_string_lossy().into_owned(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        // Dropping `tx` on an early return rolls the row back.
        write_atomic(&artifact_path, &artifact)?;
        if let Err(err) = tx.commit() {
            let _ = fs::remove_file(&artifact_path);
            return Err(err.into());
        }

        info!(
            component = "registry",
            event = "registry.model.registered",
            name,
            version,
            mae = metrics.mae,
            r2 = metrics.r2,
            path = %artifact_path.display()
        );

        Ok(version)
    }

    pub fn load(&self, name: &str, version: i64) -> Result<BucketMeanModel, RegistryError> {
        let entry = self
            .describe(name, version)?
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
                version,
            })?;
        let bytes = fs::read(&entry.artifact_path)?;
        let model = serde_json::from_slice(&bytes)?;

        info!(
            component = "registry",
            event = "registry.model.loaded",
            name,
            version
        );

        Ok(model)
    }

    pub fn describe(
        &self,
        name: &str,
        version: i64,
    ) -> Result<Option<RegisteredModel>, RegistryError> {
        let raw = self
            .conn
            .query_row(
                "
                SELECT name, version, params_json, metrics_json, artifact_path, created_at_utc
                FROM model_versions
                WHERE name = ?1 AND version = ?2
                ",
                params![name, version],
                raw_entry,
            )
            .optional()?;
        raw.map(|raw| self.decode(raw)).transpose()
    }

    /// All registered versions ordered by name, then version.
    pub fn list(&self) -> Result<Vec<RegisteredModel>, RegistryError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT name, version, params_json, metrics_json, artifact_path, created_at_utc
            FROM model_versions
            ORDER BY name ASC, version ASC
            ",
        )?;
        let raws = stmt
            .query_map([], raw_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(|raw| self.decode(raw)).collect()
    }

    fn decode(&self, raw: RawEntry) -> Result<RegisteredModel, RegistryError> {
        Ok(RegisteredModel {
            name: raw.name,
            version: raw.version,
            params: serde_json::from_str(&raw.params_json)?,
            metrics: serde_json::from_str(&raw.metrics_json)?,
            artifact_path: self.root.join(raw.artifact_path),
            created_at_utc: raw.created_at_utc,
        })
    }
}

struct RawEntry {
    name: String,
    version: i64,
    params_json: String,
    metrics_json: String,
    artifact_path: String,
    created_at_utc: String,
}

fn raw_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        name: row.get(0)?,
        version: row.get(1)?,
        params_json: row.get(2)?,
        metrics_json: row.get(3)?,
        artifact_path: row.get(4)?,
        created_at_utc: row.get(5)?,
    })
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}
