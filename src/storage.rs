// 🗄️ Template Storage - Load and save nested templates by id and version
//
// Versions are append-only: a save never overwrites, it adds version N+1.
// Saving content identical to the latest version (same SHA-256) is a no-op
// that returns the latest version.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::template::TemplateContent;

// ============================================================================
// VERSION INFO
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub template_id: String,
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub author: String,
    pub content_hash: String,
}

/// SHA-256 (hex) of the canonical JSON of a template
pub fn content_hash(content: &TemplateContent) -> Result<String> {
    let json = serde_json::to_string(content).context("Failed to serialize template")?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// STORAGE API
// ============================================================================

pub trait TemplateStorage {
    /// Load `version`, or the latest version when `None`
    fn load(&self, template_id: &str, version: Option<u32>) -> Result<TemplateContent>;

    /// Save a new version (or return the latest one when content is unchanged)
    fn save(&mut self, template_id: &str, content: &TemplateContent, author: &str) -> Result<VersionInfo>;

    /// All versions, oldest first
    fn versions(&self, template_id: &str) -> Result<Vec<VersionInfo>>;
}

fn not_found(template_id: &str, version: Option<u32>) -> anyhow::Error {
    match version {
        Some(v) => anyhow!("Template not found: {} (version {})", template_id, v),
        None => anyhow!("Template not found: {}", template_id),
    }
}

// ============================================================================
// IN-MEMORY STORAGE
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemoryTemplateStorage {
    templates: HashMap<String, Vec<(VersionInfo, TemplateContent)>>,
}

impl InMemoryTemplateStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateStorage for InMemoryTemplateStorage {
    fn load(&self, template_id: &str, version: Option<u32>) -> Result<TemplateContent> {
        let versions = self
            .templates
            .get(template_id)
            .ok_or_else(|| not_found(template_id, version))?;

        let found = match version {
            Some(v) => versions.iter().find(|(info, _)| info.version == v),
            None => versions.last(),
        };
        found
            .map(|(_, content)| content.clone())
            .ok_or_else(|| not_found(template_id, version))
    }

    fn save(&mut self, template_id: &str, content: &TemplateContent, author: &str) -> Result<VersionInfo> {
        let hash = content_hash(content)?;
        let versions = self.templates.entry(template_id.to_string()).or_default();

        if let Some((latest, _)) = versions.last() {
            if latest.content_hash == hash {
                return Ok(latest.clone());
            }
        }

        let info = VersionInfo {
            template_id: template_id.to_string(),
            version: versions.len() as u32 + 1,
            saved_at: Utc::now(),
            author: author.to_string(),
            content_hash: hash,
        };
        versions.push((info.clone(), content.clone()));
        Ok(info)
    }

    fn versions(&self, template_id: &str) -> Result<Vec<VersionInfo>> {
        Ok(self
            .templates
            .get(template_id)
            .map(|versions| versions.iter().map(|(info, _)| info.clone()).collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// SQLITE STORAGE
// ============================================================================

/// Audit record written for every stored version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub template_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

pub struct SqliteTemplateStorage {
    conn: Connection,
}

impl SqliteTemplateStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open template database: {:?}", path.as_ref()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteTemplateStorage { conn })
    }

    /// Audit events for a template, newest first
    pub fn events_for_template(&self, template_id: &str) -> Result<Vec<StorageEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, event_type, template_id, data, actor
             FROM events
             WHERE template_id = ?1
             ORDER BY id DESC",
        )?;

        let rows = stmt
            .query_map(params![template_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(event_id, timestamp, event_type, template_id, data, actor)| {
                Ok(StorageEvent {
                    event_id,
                    timestamp: parse_timestamp(&timestamp)?,
                    event_type,
                    template_id,
                    data: serde_json::from_str(&data).context("Corrupt event payload")?,
                    actor,
                })
            })
            .collect()
    }

    fn latest(&self, template_id: &str) -> Result<Option<VersionInfo>> {
        let row = self
            .conn
            .query_row(
                "SELECT version, saved_at, author, content_hash
                 FROM template_versions
                 WHERE template_id = ?1
                 ORDER BY version DESC
                 LIMIT 1",
                params![template_id],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(version, saved_at, author, content_hash)| {
            Ok(VersionInfo {
                template_id: template_id.to_string(),
                version,
                saved_at: parse_timestamp(&saved_at)?,
                author,
                content_hash,
            })
        })
        .transpose()
    }

    fn insert_event(&self, event_type: &str, template_id: &str, data: serde_json::Value, actor: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (event_id, timestamp, event_type, template_id, data, actor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid::Uuid::new_v4().to_string(),
                Utc::now().to_rfc3339(),
                event_type,
                template_id,
                serde_json::to_string(&data)?,
                actor,
            ],
        )?;
        Ok(())
    }
}

impl TemplateStorage for SqliteTemplateStorage {
    fn load(&self, template_id: &str, version: Option<u32>) -> Result<TemplateContent> {
        let content: Option<String> = match version {
            Some(v) => self
                .conn
                .query_row(
                    "SELECT content FROM template_versions WHERE template_id = ?1 AND version = ?2",
                    params![template_id, v],
                    |row| row.get(0),
                )
                .optional()?,
            None => self
                .conn
                .query_row(
                    "SELECT content FROM template_versions WHERE template_id = ?1
                     ORDER BY version DESC LIMIT 1",
                    params![template_id],
                    |row| row.get(0),
                )
                .optional()?,
        };

        let content = content.ok_or_else(|| not_found(template_id, version))?;
        info!(template_id, ?version, "template loaded");
        serde_json::from_str(&content).context("Failed to parse stored template")
    }

    fn save(&mut self, template_id: &str, content: &TemplateContent, author: &str) -> Result<VersionInfo> {
        let hash = content_hash(content)?;
        let latest = self.latest(template_id)?;

        if let Some(latest) = latest.as_ref().filter(|l| l.content_hash == hash) {
            info!(template_id, version = latest.version, "template unchanged, save skipped");
            return Ok(latest.clone());
        }

        let info = VersionInfo {
            template_id: template_id.to_string(),
            version: latest.map(|l| l.version + 1).unwrap_or(1),
            saved_at: Utc::now(),
            author: author.to_string(),
            content_hash: hash,
        };

        let json = serde_json::to_string(content).context("Failed to serialize template")?;
        self.conn.execute(
            "INSERT INTO template_versions (template_id, version, saved_at, author, content_hash, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                info.template_id,
                info.version,
                info.saved_at.to_rfc3339(),
                info.author,
                info.content_hash,
                json,
            ],
        )?;

        self.insert_event(
            "template_saved",
            template_id,
            serde_json::json!({
                "version": info.version,
                "contentHash": info.content_hash,
                "fundingLines": content.funding_lines.len(),
            }),
            author,
        )?;

        info!(template_id, version = info.version, "template saved");
        Ok(info)
    }

    fn versions(&self, template_id: &str) -> Result<Vec<VersionInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT version, saved_at, author, content_hash
             FROM template_versions
             WHERE template_id = ?1
             ORDER BY version ASC",
        )?;

        let rows = stmt
            .query_map(params![template_id], |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(version, saved_at, author, content_hash)| {
                Ok(VersionInfo {
                    template_id: template_id.to_string(),
                    version,
                    saved_at: parse_timestamp(&saved_at)?,
                    author,
                    content_hash,
                })
            })
            .collect()
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp: {}", raw))?
        .with_timezone(&Utc))
}

fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS template_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            template_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            saved_at TEXT NOT NULL,
            author TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            content TEXT NOT NULL,
            UNIQUE (template_id, version)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            template_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_template ON events(template_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
