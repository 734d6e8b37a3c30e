//! SQLite persistence — bots, personas, transcripts, sessions, usage
//! counters, and encrypted API keys in one database file.
//!
//! Saves are whole-bucket rewrites inside a transaction: state is small
//! (one user's chats) and the saver already debounces, so replace-all is
//! simpler and safer than row-level diffing. API key values are encrypted
//! with the master passphrase before hitting disk.

pub mod crypto;
pub mod saver;
pub mod shadow;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::state::{
    BotProfile, ChatMessage, ChatSession, ConversationMode, Gender, Persona, Sender,
};
use crate::usage::{UsageKey, UsageRecord};

/// A stored API key. `value` never leaves the database unencrypted
/// except through `decrypt_api_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub id: Uuid,
    pub provider: String,
    pub label: String,
    pub is_active: bool,
    pub is_exhausted: bool,
    pub added_at: DateTime<Utc>,
}

pub struct Store {
    db: Mutex<Connection>,
    master_passphrase: Vec<u8>,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path, master_passphrase: Vec<u8>) -> Result<Self> {
        let db = Connection::open(db_path).context("failed to open companiond database")?;

        // WAL mode for concurrent reads
        db.pragma_update(None, "journal_mode", "WAL")?;
        db.pragma_update(None, "foreign_keys", "ON")?;

        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS bots (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                personality TEXT NOT NULL,
                scenario TEXT NOT NULL DEFAULT '',
                avatar_ref TEXT,
                mode TEXT NOT NULL DEFAULT 'normal',
                gender TEXT NOT NULL DEFAULT 'female',
                persona_id TEXT
            );

            CREATE TABLE IF NOT EXISTS personas (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                bot_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT
            );

            CREATE TABLE IF NOT EXISTS usage (
                date TEXT NOT NULL,
                model_id TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                limit_reached BOOLEAN NOT NULL DEFAULT 0,
                PRIMARY KEY (date, model_id)
            );

            CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                label TEXT NOT NULL,
                encrypted_value BLOB NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                is_exhausted BOOLEAN NOT NULL DEFAULT 0,
                added_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_bot ON messages(bot_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_sessions_bot ON sessions(bot_id);
            ",
        )?;

        Ok(Self {
            db: Mutex::new(db),
            master_passphrase,
        })
    }

    // ── Bots ──

    pub fn save_bots(&self, bots: &[BotProfile]) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute("DELETE FROM bots", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO bots (id, name, personality, scenario, avatar_ref, mode, gender, persona_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for bot in bots {
                stmt.execute(params![
                    bot.id.to_string(),
                    bot.name,
                    bot.personality,
                    bot.scenario,
                    bot.avatar_ref,
                    mode_str(bot.mode),
                    gender_str(bot.gender),
                    bot.persona_id.map(|id| id.to_string()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_bots(&self) -> Result<Vec<BotProfile>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, name, personality, scenario, avatar_ref, mode, gender, persona_id FROM bots",
        )?;
        let bots = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let mode: String = row.get(5)?;
                let gender: String = row.get(6)?;
                let persona_id: Option<String> = row.get(7)?;
                Ok(BotProfile {
                    id: parse_uuid(&id),
                    name: row.get(1)?,
                    personality: row.get(2)?,
                    scenario: row.get(3)?,
                    avatar_ref: row.get(4)?,
                    mode: parse_mode(&mode),
                    gender: parse_gender(&gender),
                    persona_id: persona_id.as_deref().and_then(|s| Uuid::parse_str(s).ok()),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bots)
    }

    // ── Personas ──

    pub fn save_personas(&self, personas: &[Persona]) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute("DELETE FROM personas", [])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO personas (id, name, description) VALUES (?1, ?2, ?3)")?;
            for persona in personas {
                stmt.execute(params![
                    persona.id.to_string(),
                    persona.name,
                    persona.description
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_personas(&self) -> Result<Vec<Persona>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT id, name, description FROM personas")?;
        let personas = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                Ok(Persona {
                    id: parse_uuid(&id),
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(personas)
    }

    // ── Messages ──

    pub fn save_messages(&self, histories: &HashMap<Uuid, Vec<ChatMessage>>) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute("DELETE FROM messages", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages (id, bot_id, sender, text, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (bot_id, messages) in histories {
                for msg in messages {
                    stmt.execute(params![
                        msg.id.to_string(),
                        bot_id.to_string(),
                        sender_str(msg.sender),
                        msg.text,
                        msg.timestamp.to_rfc3339(),
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_messages(&self) -> Result<HashMap<Uuid, Vec<ChatMessage>>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, bot_id, sender, text, timestamp FROM messages ORDER BY bot_id, timestamp",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let bot_id: String = row.get(1)?;
                let sender: String = row.get(2)?;
                let timestamp: String = row.get(4)?;
                Ok((
                    parse_uuid(&bot_id),
                    ChatMessage {
                        id: parse_uuid(&id),
                        sender: parse_sender(&sender),
                        text: row.get(3)?,
                        timestamp: parse_timestamp(&timestamp),
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut histories: HashMap<Uuid, Vec<ChatMessage>> = HashMap::new();
        for (bot_id, msg) in rows {
            histories.entry(bot_id).or_default().push(msg);
        }
        Ok(histories)
    }

    // ── Sessions ──

    pub fn save_sessions(&self, sessions: &[ChatSession]) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute("DELETE FROM sessions", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sessions (id, bot_id, started_at, ended_at) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for session in sessions {
                stmt.execute(params![
                    session.id.to_string(),
                    session.bot_id.to_string(),
                    session.started_at.to_rfc3339(),
                    session.ended_at.map(|t| t.to_rfc3339()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_sessions(&self) -> Result<Vec<ChatSession>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT id, bot_id, started_at, ended_at FROM sessions ORDER BY started_at")?;
        let sessions = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let bot_id: String = row.get(1)?;
                let started_at: String = row.get(2)?;
                let ended_at: Option<String> = row.get(3)?;
                Ok(ChatSession {
                    id: parse_uuid(&id),
                    bot_id: parse_uuid(&bot_id),
                    started_at: parse_timestamp(&started_at),
                    ended_at: ended_at.as_deref().map(parse_timestamp),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    // ── Usage ──

    pub fn save_usage(&self, rows: &[(UsageKey, UsageRecord)]) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute("DELETE FROM usage", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO usage (date, model_id, count, limit_reached) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (key, record) in rows {
                stmt.execute(params![
                    key.date.to_string(),
                    key.model_id,
                    record.count,
                    record.limit_reached,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_usage(&self) -> Result<Vec<(UsageKey, UsageRecord)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT date, model_id, count, limit_reached FROM usage")?;
        let rows = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                Ok((
                    UsageKey {
                        date: date.parse::<NaiveDate>().unwrap_or_default(),
                        model_id: row.get(1)?,
                    },
                    UsageRecord {
                        count: row.get(2)?,
                        limit_reached: row.get(3)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── API Keys ──

    /// Store a key, encrypted. The new key becomes the provider's sole
    /// active key, and saving any key clears the exhausted flag on every
    /// stored key: a fresh credential starts with a clean slate.
    pub fn save_api_key(&self, provider: &str, label: &str, raw_value: &str) -> Result<Uuid> {
        let encrypted = crypto::encrypt(raw_value.as_bytes(), &self.master_passphrase);
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO api_keys (id, provider, label, encrypted_value, is_active, is_exhausted, added_at)
             VALUES (?1, ?2, ?3, ?4, 1, 0, ?5)",
            params![id.to_string(), provider, label, encrypted, now],
        )?;
        db.execute(
            "UPDATE api_keys SET is_active = (id = ?1) WHERE provider = ?2",
            params![id.to_string(), provider],
        )?;
        db.execute("UPDATE api_keys SET is_exhausted = 0", [])?;

        tracing::info!(provider, label, "api key saved");
        Ok(id)
    }

    pub fn remove_api_key(&self, id: &Uuid) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let rows = db.execute(
            "DELETE FROM api_keys WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Make one key the active key for its provider.
    pub fn activate_api_key(&self, id: &Uuid) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let provider: Option<String> = db
            .query_row(
                "SELECT provider FROM api_keys WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some(provider) = provider else {
            return Ok(false);
        };
        db.execute(
            "UPDATE api_keys SET is_active = (id = ?1) WHERE provider = ?2",
            params![id.to_string(), provider],
        )?;
        Ok(true)
    }

    pub fn mark_key_exhausted(&self, provider: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE api_keys SET is_exhausted = 1 WHERE provider = ?1 AND is_active = 1",
            params![provider],
        )?;
        Ok(())
    }

    /// List keys without decrypting values.
    pub fn list_api_keys(&self) -> Result<Vec<ApiKeyEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, provider, label, is_active, is_exhausted, added_at
             FROM api_keys ORDER BY added_at",
        )?;
        let entries = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let added_at: String = row.get(5)?;
                Ok(ApiKeyEntry {
                    id: parse_uuid(&id),
                    provider: row.get(1)?,
                    label: row.get(2)?,
                    is_active: row.get(3)?,
                    is_exhausted: row.get(4)?,
                    added_at: parse_timestamp(&added_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Decrypt the active key for a provider. Callers must zeroize the
    /// result when done with it.
    pub fn decrypt_api_key(&self, provider: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let encrypted: Option<Vec<u8>> = db
            .query_row(
                "SELECT encrypted_value FROM api_keys WHERE provider = ?1 AND is_active = 1",
                params![provider],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some(encrypted) = encrypted else {
            return Ok(None);
        };

        let mut plaintext = crypto::decrypt(&encrypted, &self.master_passphrase)?;
        let result = String::from_utf8(plaintext.clone()).context("key is not valid UTF-8")?;
        plaintext.zeroize();
        Ok(Some(result))
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.master_passphrase.zeroize();
    }
}

// ── Column codecs ───────────────────────────────────────────────────

fn mode_str(mode: ConversationMode) -> &'static str {
    match mode {
        ConversationMode::Normal => "normal",
        ConversationMode::Spicy => "spicy",
        ConversationMode::Extreme => "extreme",
    }
}

fn parse_mode(s: &str) -> ConversationMode {
    match s {
        "spicy" => ConversationMode::Spicy,
        "extreme" => ConversationMode::Extreme,
        _ => ConversationMode::Normal,
    }
}

fn gender_str(gender: Gender) -> &'static str {
    match gender {
        Gender::Female => "female",
        Gender::Male => "male",
        Gender::Fluid => "fluid",
    }
}

fn parse_gender(s: &str) -> Gender {
    match s {
        "male" => Gender::Male,
        "fluid" => Gender::Fluid,
        _ => Gender::Female,
    }
}

fn sender_str(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "user",
        Sender::Bot => "bot",
    }
}

fn parse_sender(s: &str) -> Sender {
    match s {
        "user" => Sender::User,
        _ => Sender::Bot,
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_default()
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
