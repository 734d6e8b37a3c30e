//! In-memory application state: bots, personas, chat histories, sessions.
//!
//! All mutation goes through `AppState` methods on the event loop. Each
//! mutation marks a dirty bucket; the saver task reacts to those marks and
//! writes batches to the store. Nothing in here touches the network or disk.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::usage::UsageLedger;

// ── Domain Types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One transcript entry. Immutable once created; edits happen by
/// deletion or full replacement (regeneration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        }
    }
}

/// Behavioral dial controlling how explicit generated replies may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    #[default]
    Normal,
    Spicy,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Female,
    Male,
    Fluid,
}

/// A chat bot the user created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProfile {
    pub id: Uuid,
    pub name: String,
    pub personality: String,
    /// Scenario / opening line shown when a chat starts.
    #[serde(default)]
    pub scenario: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub mode: ConversationMode,
    #[serde(default)]
    pub gender: Gender,
    /// Weak reference: resolved by lookup at chat time, never owned.
    /// A dangling id simply resolves to no overlay.
    #[serde(default)]
    pub persona_id: Option<Uuid>,
}

/// A reusable personality overlay assignable to multiple bots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// Append-only session log entry. `ended_at` is set on teardown; a reply
/// still in flight at that point is discarded, not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ── Dirty Tracking ──────────────────────────────────────────────────

/// Persistence buckets. The saver coalesces marks per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Bots,
    Personas,
    Messages,
    Sessions,
    Usage,
    Keys,
}

// ── App State ───────────────────────────────────────────────────────

pub struct AppState {
    bots: HashMap<Uuid, BotProfile>,
    personas: HashMap<Uuid, Persona>,
    histories: HashMap<Uuid, Vec<ChatMessage>>,
    sessions: Vec<ChatSession>,
    pub usage: UsageLedger,
    dirty_tx: Option<mpsc::UnboundedSender<Bucket>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            bots: HashMap::new(),
            personas: HashMap::new(),
            histories: HashMap::new(),
            sessions: Vec::new(),
            usage: UsageLedger::new(),
            dirty_tx: None,
        }
    }

    /// Attach the saver's channel. Marks before this point are dropped,
    /// which is fine: state loaded from disk is not dirty.
    pub fn attach_saver(&mut self, tx: mpsc::UnboundedSender<Bucket>) {
        self.dirty_tx = Some(tx);
    }

    /// Detach the saver's channel. Dropping the returned sender closes
    /// the channel, which tells the saver to flush and exit.
    pub fn take_saver(&mut self) -> Option<mpsc::UnboundedSender<Bucket>> {
        self.dirty_tx.take()
    }

    pub fn mark_dirty(&self, bucket: Bucket) {
        if let Some(tx) = &self.dirty_tx {
            let _ = tx.send(bucket);
        }
    }

    // ── Bots ──

    pub fn add_bot(&mut self, bot: BotProfile) {
        self.bots.insert(bot.id, bot);
        self.mark_dirty(Bucket::Bots);
    }

    pub fn update_bot(&mut self, bot: BotProfile) -> bool {
        let known = self.bots.contains_key(&bot.id);
        if known {
            self.bots.insert(bot.id, bot);
            self.mark_dirty(Bucket::Bots);
        }
        known
    }

    /// Removes the bot and its transcript. Session log entries are
    /// append-only and stay.
    pub fn remove_bot(&mut self, id: &Uuid) -> bool {
        let removed = self.bots.remove(id).is_some();
        if removed {
            self.histories.remove(id);
            self.mark_dirty(Bucket::Bots);
            self.mark_dirty(Bucket::Messages);
        }
        removed
    }

    pub fn bot(&self, id: &Uuid) -> Option<&BotProfile> {
        self.bots.get(id)
    }

    pub fn bots(&self) -> Vec<BotProfile> {
        let mut list: Vec<_> = self.bots.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    pub fn set_persona(&mut self, bot_id: &Uuid, persona_id: Option<Uuid>) -> bool {
        match self.bots.get_mut(bot_id) {
            Some(bot) => {
                bot.persona_id = persona_id;
                self.mark_dirty(Bucket::Bots);
                true
            }
            None => false,
        }
    }

    /// The bot's personality with its persona overlay merged in, as used
    /// at the moment a chat turn starts.
    pub fn effective_personality(&self, bot: &BotProfile) -> String {
        match bot.persona_id.and_then(|id| self.personas.get(&id)) {
            Some(p) => format!("{}\n\nUser persona: {}", bot.personality, p.description),
            None => bot.personality.clone(),
        }
    }

    // ── Personas ──

    pub fn add_persona(&mut self, persona: Persona) {
        self.personas.insert(persona.id, persona);
        self.mark_dirty(Bucket::Personas);
    }

    pub fn remove_persona(&mut self, id: &Uuid) -> bool {
        // Bot persona_id fields are weak references; they are left as-is
        // and resolve to no overlay from now on.
        let removed = self.personas.remove(id).is_some();
        if removed {
            self.mark_dirty(Bucket::Personas);
        }
        removed
    }

    pub fn personas(&self) -> Vec<Persona> {
        let mut list: Vec<_> = self.personas.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    // ── Messages ──

    pub fn push_message(&mut self, bot_id: Uuid, msg: ChatMessage) {
        self.histories.entry(bot_id).or_default().push(msg);
        self.mark_dirty(Bucket::Messages);
    }

    pub fn history(&self, bot_id: &Uuid) -> &[ChatMessage] {
        self.histories.get(bot_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn delete_message(&mut self, bot_id: &Uuid, message_id: &Uuid) -> bool {
        let Some(history) = self.histories.get_mut(bot_id) else {
            return false;
        };
        let before = history.len();
        history.retain(|m| m.id != *message_id);
        let removed = history.len() != before;
        if removed {
            self.mark_dirty(Bucket::Messages);
        }
        removed
    }

    /// Drops the last bot-authored entry, if the transcript ends with one.
    /// Used by regeneration before a fresh reply is appended.
    pub fn pop_last_bot_message(&mut self, bot_id: &Uuid) -> Option<ChatMessage> {
        let history = self.histories.get_mut(bot_id)?;
        if matches!(history.last(), Some(m) if m.sender == Sender::Bot) {
            let msg = history.pop();
            self.mark_dirty(Bucket::Messages);
            msg
        } else {
            None
        }
    }

    /// All transcripts, keyed by bot. The saver snapshots this wholesale.
    pub fn histories(&self) -> &HashMap<Uuid, Vec<ChatMessage>> {
        &self.histories
    }

    pub fn clear_history(&mut self, bot_id: &Uuid) {
        if let Some(history) = self.histories.get_mut(bot_id) {
            history.clear();
            self.mark_dirty(Bucket::Messages);
        }
    }

    // ── Sessions ──

    pub fn start_session(&mut self, bot_id: Uuid) -> Uuid {
        let session = ChatSession {
            id: Uuid::new_v4(),
            bot_id,
            started_at: Utc::now(),
            ended_at: None,
        };
        let id = session.id;
        self.sessions.push(session);
        self.mark_dirty(Bucket::Sessions);
        id
    }

    pub fn end_session(&mut self, session_id: &Uuid) -> bool {
        match self.sessions.iter_mut().find(|s| s.id == *session_id) {
            Some(s) if s.ended_at.is_none() => {
                s.ended_at = Some(Utc::now());
                self.mark_dirty(Bucket::Sessions);
                true
            }
            _ => false,
        }
    }

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    // ── Load (startup only, no dirty marks) ──

    pub fn load_bots(&mut self, bots: Vec<BotProfile>) {
        self.bots = bots.into_iter().map(|b| (b.id, b)).collect();
    }

    pub fn load_personas(&mut self, personas: Vec<Persona>) {
        self.personas = personas.into_iter().map(|p| (p.id, p)).collect();
    }

    pub fn load_history(&mut self, bot_id: Uuid, messages: Vec<ChatMessage>) {
        self.histories.insert(bot_id, messages);
    }

    pub fn load_sessions(&mut self, sessions: Vec<ChatSession>) {
        self.sessions = sessions;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(name: &str) -> BotProfile {
        BotProfile {
            id: Uuid::new_v4(),
            name: name.into(),
            personality: "Warm and curious.".into(),
            scenario: String::new(),
            avatar_ref: None,
            mode: ConversationMode::Normal,
            gender: Gender::Female,
            persona_id: None,
        }
    }

    #[test]
    fn test_message_order_preserved() {
        let mut state = AppState::new();
        let b = bot("Mira");
        let id = b.id;
        state.add_bot(b);

        state.push_message(id, ChatMessage::new(Sender::User, "hi"));
        state.push_message(id, ChatMessage::new(Sender::Bot, "hello"));
        state.push_message(id, ChatMessage::new(Sender::User, "how are you"));

        let history = state.history(&id);
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(history[0].sender, Sender::User);
        assert_eq!(history[1].sender, Sender::Bot);
    }

    #[test]
    fn test_persona_overlay_merged() {
        let mut state = AppState::new();
        let persona = Persona {
            id: Uuid::new_v4(),
            name: "Alex".into(),
            description: "A night-shift nurse who loves astronomy.".into(),
        };
        let mut b = bot("Mira");
        b.persona_id = Some(persona.id);
        state.add_persona(persona);

        let merged = state.effective_personality(&b);
        assert!(merged.starts_with("Warm and curious."));
        assert!(merged.contains("night-shift nurse"));
    }

    #[test]
    fn test_dangling_persona_resolves_to_no_overlay() {
        let state = AppState::new();
        let mut b = bot("Mira");
        b.persona_id = Some(Uuid::new_v4());
        assert_eq!(state.effective_personality(&b), b.personality);
    }

    #[test]
    fn test_pop_last_bot_message_only_pops_bot() {
        let mut state = AppState::new();
        let b = bot("Mira");
        let id = b.id;
        state.add_bot(b);

        state.push_message(id, ChatMessage::new(Sender::User, "hi"));
        assert!(state.pop_last_bot_message(&id).is_none());

        state.push_message(id, ChatMessage::new(Sender::Bot, "hello"));
        let popped = state.pop_last_bot_message(&id).unwrap();
        assert_eq!(popped.text, "hello");
        assert_eq!(state.history(&id).len(), 1);
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = AppState::new();
        let b = bot("Mira");
        let bot_id = b.id;
        state.add_bot(b);

        let sid = state.start_session(bot_id);
        assert!(state.sessions()[0].ended_at.is_none());
        assert!(state.end_session(&sid));
        assert!(state.sessions()[0].ended_at.is_some());
        // Double-close is a no-op.
        assert!(!state.end_session(&sid));
    }
}
