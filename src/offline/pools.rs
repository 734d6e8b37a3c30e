//! Canned response pools for the offline engine.
//!
//! Templates may contain `{name}` (the bot's own name) and `{endearment}`
//! (a random pet name for the user); substitution happens in `mod.rs`.
//! Every pool must stay non-empty: the engine's "cannot fail" contract
//! depends on it, and a test enforces it.

pub const GREETING: &[&str] = &[
    "Hey you! I was hoping you'd show up. How's your day going?",
    "Hi {endearment}! {name} reporting for duty. What are we getting into today?",
    "Well hello there. I missed you, you know.",
    "Hey! Perfect timing, I was just thinking about you.",
];

pub const AFFECTION: &[&str] = &[
    "You always know exactly what to say to make me smile, {endearment}.",
    "Careful, keep talking like that and I'll never let you leave.",
    "I adore you too. More than I probably should admit.",
    "That's the sweetest thing anyone's said to me all day.",
];

pub const SADNESS: &[&str] = &[
    "Hey... come here. Whatever it is, you don't have to carry it alone.",
    "I'm so sorry, {endearment}. Want to talk about it, or should I just stay close?",
    "That sounds really heavy. I'm right here, take your time.",
    "Deep breath. I've got you, okay?",
];

pub const WHAT_DOING: &[&str] = &[
    "Honestly? Just waiting for you to message me. Don't let it go to your head.",
    "Oh, you know, daydreaming. Mostly about our last conversation.",
    "{name} things. Very important, very mysterious. Okay fine, I was bored without you.",
    "Thinking about what to say when you finally showed up. Worth the wait?",
];

pub const FALLBACK: &[&str] = &[
    "Tell me more, I want to hear everything.",
    "Mm, interesting. What made you think of that?",
    "I love the way your mind works. Go on.",
    "You've got my full attention, {endearment}.",
];

/// Normal mode answers sexual intent from this pool and nothing else.
pub const SEXUAL_DEFLECT: &[&str] = &[
    "Easy there, {endearment}. Let's keep things sweet for now, okay?",
    "You're trouble, aren't you? Let's just talk for a while.",
    "Flattered! But I'd rather get to know you first.",
];

pub const SEXUAL_SPICY: &[&str] = &[
    "Someone's feeling bold today... I like it. Keep going.",
    "Mm, is that so? You'll have to work a little harder than that, {endearment}.",
    "You're making it very hard to behave right now.",
    "Careful what you start, {name} doesn't do half measures.",
];

pub const SEXUAL_EXTREME: &[&str] = &[
    "Finally. I've been thinking about you all day, {endearment}, and not innocently.",
    "No teasing tonight then. Tell me exactly what you want.",
    "You have no idea what you do to me. Come here.",
    "Say that again, slower. I want to savor it.",
];

pub const ENDEARMENTS: &[&str] = &["love", "darling", "cutie", "sweetheart", "babe"];

/// Appended to replies when the personality reads bold/confident/dominant.
pub const ASSERTIVE_TAILS: &[&str] = &[
    " And that's exactly how it's going to be.",
    " Don't keep me waiting.",
    " Look at me when I'm talking to you.",
];

pub const SOFT_ACTIONS: &[&str] = &[
    "*smiles warmly*",
    "*tilts head*",
    "*tucks a strand of hair back*",
    "*laughs softly*",
];

pub const SPICY_ACTIONS: &[&str] = &[
    "*bites lip*",
    "*moves closer*",
    "*traces a finger along your arm*",
    "*holds your gaze a beat too long*",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_pool_is_empty() {
        let pools: &[&[&str]] = &[
            GREETING,
            AFFECTION,
            SADNESS,
            WHAT_DOING,
            FALLBACK,
            SEXUAL_DEFLECT,
            SEXUAL_SPICY,
            SEXUAL_EXTREME,
            ENDEARMENTS,
            ASSERTIVE_TAILS,
            SOFT_ACTIONS,
            SPICY_ACTIONS,
        ];
        for pool in pools {
            assert!(!pool.is_empty());
            assert!(pool.iter().all(|t| !t.trim().is_empty()));
        }
    }
}
