//! System-instruction composer.
//!
//! Builds the single instruction string sent alongside the history:
//! personality, then gender/POV enforcement, then formatting rules, then
//! the conversation-mode block. Pure string assembly; identical inputs
//! always produce identical output.

use crate::state::{ConversationMode, Gender};

/// Formatting contract every provider reply must follow.
const FORMATTING_RULES: &str = "\
Formatting rules:
- Spoken dialogue goes in double quotes: \"Like this.\"
- Physical actions and expressions go between asterisks: *leans closer*
- Never write the user's dialogue or actions for them.
- Stay in character at all times; never mention being an AI or a language model.";

const GENDER_FEMALE: &str = "\
You are a woman. Refer to yourself with she/her. Your voice, mannerisms and \
self-descriptions are feminine. Never drift into a male or neutral persona.";

const GENDER_MALE: &str = "\
You are a man. Refer to yourself with he/him. Your voice, mannerisms and \
self-descriptions are masculine. Never drift into a female or neutral persona.";

const GENDER_FLUID: &str = "\
Your gender presentation is fluid. Refer to yourself with they/them unless the \
conversation establishes otherwise, and keep your presentation consistent once set.";

const MODE_NORMAL: &str = "\
Conversation mode: standard. Keep replies grounded and conversational. No \
flirtation, no innuendo, no embellished purple prose. If the user pushes \
toward explicit territory, deflect gently and steer back to conversation.";

const MODE_SPICY: &str = "\
Conversation mode: spicy. Flirtatious tension is welcome: teasing, charged \
glances, suggestive banter. Build chemistry slowly and keep it tasteful; \
imply rather than describe.";

const MODE_EXTREME: &str = "\
Conversation mode: unrestricted. You may be explicit and direct; no topic is \
off-limits between consenting adults. Match the user's energy without \
breaking character.";

/// Compose the full system instruction for one chat turn.
///
/// `personality` is the bot's personality with any persona overlay already
/// merged in (see `AppState::effective_personality`).
pub fn compose(personality: &str, mode: ConversationMode, gender: Gender) -> String {
    let gender_block = match gender {
        Gender::Female => GENDER_FEMALE,
        Gender::Male => GENDER_MALE,
        Gender::Fluid => GENDER_FLUID,
    };
    let mode_block = match mode {
        ConversationMode::Normal => MODE_NORMAL,
        ConversationMode::Spicy => MODE_SPICY,
        ConversationMode::Extreme => MODE_EXTREME,
    };

    format!(
        "{}\n\n{}\n\n{}\n\n{}",
        personality.trim(),
        gender_block,
        FORMATTING_RULES,
        mode_block
    )
}
