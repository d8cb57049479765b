//! Canned vocabulary.
//!
//! The fallback lexicon covers every case where a real word is needed
//! but none is available: a player disconnects mid-phase, the word
//! provider times out, or a phase deadline passes with seats unplayed.
//! Picks are random so auto-filled sentences don't all read the same.

use rand::prelude::IndexedRandom;
use rand::Rng;

const SUBJECTS: &[&str] = &[
    "walrus", "librarian", "comet", "teapot", "ghost", "cartographer",
    "pigeon", "volcano", "violin", "astronaut",
];

const VERBS: &[&str] = &[
    "devours", "serenades", "juggles", "interrogates", "polishes",
    "smuggles", "hypnotizes", "applauds", "untangles", "bamboozles",
];

const OBJECTS: &[&str] = &[
    "accordion", "meteorite", "sandwich", "chandelier", "manifesto",
    "submarine", "cactus", "thesaurus", "trampoline", "monocle",
];

const PLACES: &[&str] = &[
    "underwater", "backstage", "uptown", "downstairs", "overseas",
    "nearby", "elsewhere", "upstairs", "outside", "indoors",
];

// Used when a session was created with a phase key we have no list for.
const ANYTHING: &[&str] = &[
    "mystery", "whatever", "something", "surprise", "wildcard",
];

/// A random fallback word fitting the given phase key.
pub fn fallback_word<R: Rng + ?Sized>(phase_key: &str, rng: &mut R) -> &'static str {
    let pool = match phase_key {
        "subject" => SUBJECTS,
        "verb" => VERBS,
        "object" => OBJECTS,
        "place" => PLACES,
        _ => ANYTHING,
    };
    pool.choose(rng).copied().unwrap_or("mystery")
}

/// Display names for bot seats, cycled in order.
pub const BOT_NAMES: &[&str] = &[
    "Verse-o-Tron",
    "Inkbot",
    "Quillard",
    "Syntaximus",
    "Madame Lexeme",
    "Babbage Jr.",
];

/// Personality tags cycled across bot seats and passed to the word
/// provider as flavor.
pub const PERSONAS: &[&str] = &[
    "dadaist poet",
    "pulp noir narrator",
    "overexcited sports commentator",
    "deadpan bureaucrat",
    "romantic astronomer",
    "conspiratorial pirate",
];

/// Name and persona for the `index`-th bot in a session.
pub fn bot_identity(index: usize) -> (&'static str, &'static str) {
    (
        BOT_NAMES[index % BOT_NAMES.len()],
        PERSONAS[index % PERSONAS.len()],
    )
}
