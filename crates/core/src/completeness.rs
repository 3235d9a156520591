//! Lexical heuristics deciding whether a stretch of user speech is finished.
//!
//! Transcription backends emit finalized text whenever the speaker pauses,
//! which is not the same thing as the speaker being done. The checks here
//! gate response generation on a cheap, purely lexical judgement: detected
//! language, trailing punctuation, dangling function words, and the presence
//! of subject- and verb-like tokens. The judgement is advisory: callers
//! enforce a timeout that forces acceptance so latency stays bounded.

use serde::{Deserialize, Serialize};

/// Languages the lexical tables cover, scanned in priority order with
/// English as the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Es,
    Fr,
    De,
    It,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::It => "it",
        }
    }

    /// Parses a two-letter code, e.g. from a client setup message.
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "en" => Some(Language::En),
            "es" => Some(Language::Es),
            "fr" => Some(Language::Fr),
            "de" => Some(Language::De),
            "it" => Some(Language::It),
            _ => None,
        }
    }

    fn profile(self) -> &'static LanguageProfile {
        match self {
            Language::En => &EN,
            Language::Es => &ES,
            Language::Fr => &FR,
            Language::De => &DE,
            Language::It => &IT,
        }
    }
}

struct LanguageProfile {
    language: Language,
    /// High-frequency words that identify the language in running text.
    detection_markers: &'static [&'static str],
    /// Complete one-shot replies accepted without further analysis.
    short_acknowledgements: &'static [&'static str],
    /// Function words that leave a sentence hanging when they end it:
    /// conjunctions, articles, prepositions, unfinished copulas and modals.
    dangling_enders: &'static [&'static str],
    pronouns: &'static [&'static str],
    verb_markers: &'static [&'static str],
}

fn contains_word(set: &[&str], word: &str) -> bool {
    set.iter().any(|&w| w == word)
}

impl LanguageProfile {
    fn is_subject_like(&self, token: &str) -> bool {
        contains_word(self.pronouns, token)
            || (!contains_word(self.dangling_enders, token)
                && !contains_word(self.verb_markers, token)
                && token.chars().count() >= 2)
    }

    fn is_verb_like(&self, token: &str) -> bool {
        contains_word(self.verb_markers, token)
            || (self.language == Language::En
                && token.len() > 4
                && (token.ends_with("ing") || token.ends_with("ed")))
    }
}

static EN: LanguageProfile = LanguageProfile {
    language: Language::En,
    detection_markers: &[],
    short_acknowledgements: &[
        "yes", "no", "ok", "okay", "sure", "maybe", "perhaps", "definitely", "absolutely",
        "never", "always", "exactly", "correct", "wrong", "true", "false", "right", "good",
        "bad", "great", "fine", "thanks", "please", "sorry", "hello", "hi", "bye", "goodbye",
    ],
    dangling_enders: &[
        "and", "but", "or", "because", "since", "although", "if", "when", "while", "which",
        "whose", "the", "a", "an", "in", "on", "at", "to", "for", "with", "from", "by",
        "about", "through", "is", "are", "was", "were", "will", "would", "could", "should",
        "can", "may", "might",
    ],
    pronouns: &[
        "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my",
        "your", "his", "its", "our", "their", "this", "that", "these", "those", "who", "what",
        "someone", "something", "anyone", "everyone",
    ],
    verb_markers: &[
        "am", "is", "are", "was", "were", "be", "been", "being", "do", "does", "did", "have",
        "has", "had", "can", "could", "will", "would", "shall", "should", "may", "might",
        "must", "want", "wants", "need", "needs", "know", "knows", "think", "thinks", "see",
        "go", "goes", "get", "gets", "got", "make", "makes", "say", "says", "said", "tell",
        "tells", "help", "helps", "like", "likes", "feel", "feels", "look", "looks", "come", "comes",
        "take", "takes", "give", "gives", "work", "works", "use", "find", "ask", "asks",
        "seem", "seems", "try", "tries", "explain", "understand",
    ],
};

static ES: LanguageProfile = LanguageProfile {
    language: Language::Es,
    detection_markers: &[
        "sí", "vale", "bueno", "quizás", "definitivamente", "absolutamente", "nunca",
        "siempre", "exacto", "correcto", "incorrecto", "verdad", "falso", "genial", "gracias",
        "perdón", "hola", "adiós", "el", "los", "las", "una", "está", "están",
    ],
    short_acknowledgements: &[
        "sí", "si", "no", "vale", "bueno", "quizás", "tal vez", "definitivamente",
        "absolutamente", "nunca", "siempre", "exacto", "correcto", "incorrecto", "verdad",
        "falso", "bien", "mal", "genial", "gracias", "por favor", "perdón", "hola", "adiós",
    ],
    dangling_enders: &[
        "y", "pero", "o", "porque", "desde", "aunque", "si", "cuando", "mientras", "que",
        "cual", "quien", "el", "la", "los", "las", "un", "una", "en", "a", "para", "con",
        "por", "hacia", "sobre", "entre", "es", "son", "era", "fueron", "será", "serían",
        "podría", "debería", "puede", "quizás",
    ],
    pronouns: &[
        "yo", "tú", "usted", "él", "ella", "nosotros", "vosotros", "ellos", "ellas", "me",
        "te", "le", "lo", "la", "nos", "os", "les", "esto", "eso", "mi", "tu", "su",
    ],
    verb_markers: &[
        "es", "son", "está", "están", "era", "eran", "fue", "fueron", "soy", "eres", "estoy",
        "estás", "hay", "tengo", "tienes", "tiene", "quiero", "quieres", "puedo", "puede",
        "sé", "sabes", "hablo", "hablas", "habla", "necesito", "ayuda", "gusta",
    ],
};

static FR: LanguageProfile = LanguageProfile {
    language: Language::Fr,
    detection_markers: &[
        "oui", "ok", "d'accord", "peut-être", "définitivement", "absolument", "jamais",
        "toujours", "exactement", "vrai", "faux", "génial", "merci", "pardon", "bonjour",
        "les", "une", "avec", "pour", "est", "sont",
    ],
    short_acknowledgements: &[
        "oui", "non", "ok", "d'accord", "peut-être", "définitivement", "absolument",
        "jamais", "toujours", "exactement", "correct", "incorrect", "vrai", "faux", "bien",
        "mal", "génial", "merci", "s'il vous plaît", "pardon", "bonjour", "au revoir",
    ],
    dangling_enders: &[
        "et", "mais", "ou", "parce", "depuis", "si", "lorsque", "pendant", "qui", "que",
        "le", "la", "les", "un", "une", "à", "dans", "pour", "avec", "par", "de", "sur",
        "entre", "est", "sont", "était", "étaient", "sera", "serait", "pourrait", "devrait",
        "peut", "peut-être",
    ],
    pronouns: &[
        "je", "tu", "il", "elle", "on", "nous", "vous", "ils", "elles", "me", "te", "se",
        "moi", "toi", "lui", "leur", "ce", "cela", "ça", "mon", "ton", "son",
    ],
    verb_markers: &[
        "est", "sont", "était", "étaient", "suis", "es", "êtes", "ai", "as", "a", "avons",
        "avez", "ont", "peux", "peut", "veux", "veut", "sais", "sait", "parle", "parlez",
        "aide", "faut", "vais", "va",
    ],
};

static DE: LanguageProfile = LanguageProfile {
    language: Language::De,
    detection_markers: &[
        "ja", "nein", "okay", "sicher", "vielleicht", "definitiv", "absolut", "nie", "immer",
        "genau", "richtig", "falsch", "wahr", "gut", "schlecht", "toll", "danke", "bitte",
        "entschuldigung", "hallo", "der", "das", "eine", "von", "mit", "für", "dass", "ist",
        "sind",
    ],
    short_acknowledgements: &[
        "ja", "nein", "ok", "okay", "sicher", "vielleicht", "definitiv", "absolut", "nie",
        "immer", "genau", "richtig", "falsch", "wahr", "gut", "schlecht", "toll", "danke",
        "bitte", "entschuldigung", "hallo", "auf wiedersehen",
    ],
    dangling_enders: &[
        "und", "aber", "oder", "weil", "seit", "obwohl", "wenn", "als", "während", "dass",
        "welche", "wer", "der", "die", "ein", "eine", "in", "an", "zu", "für", "mit", "von",
        "durch", "über", "ist", "sind", "war", "waren", "wird", "würde", "könnte", "sollte",
        "kann", "könnten",
    ],
    pronouns: &[
        "ich", "du", "er", "sie", "es", "wir", "ihr", "man", "mich", "dich", "uns", "euch",
        "ihn", "ihm", "mein", "dein", "sein", "das", "dies",
    ],
    verb_markers: &[
        "ist", "sind", "war", "waren", "bin", "bist", "habe", "hast", "hat", "haben",
        "können", "kann", "will", "wollen", "weiß", "weißt", "spreche", "sprichst",
        "sprechen", "brauche", "hilft", "mag", "möchte",
    ],
};

static IT: LanguageProfile = LanguageProfile {
    language: Language::It,
    detection_markers: &[
        "sì", "forse", "definitivamente", "assolutamente", "mai", "sempre", "esatto",
        "corretto", "sbagliato", "vero", "bene", "male", "fantastico", "grazie", "scusa",
        "ciao", "arrivederci", "il", "lo", "gli", "di", "che", "è", "sono",
    ],
    short_acknowledgements: &[
        "sì", "si", "no", "ok", "okay", "forse", "definitivamente", "assolutamente", "mai",
        "sempre", "esatto", "corretto", "sbagliato", "vero", "falso", "bene", "male",
        "fantastico", "grazie", "per favore", "scusa", "ciao", "arrivederci",
    ],
    dangling_enders: &[
        "e", "ma", "o", "perché", "da", "sebbene", "se", "quando", "mentre", "che", "quale",
        "chi", "il", "la", "i", "le", "un", "una", "in", "a", "per", "con", "di", "su",
        "tra", "è", "sono", "era", "erano", "sarà", "sarebbe", "potrebbe", "dovrebbe", "può",
    ],
    pronouns: &[
        "io", "tu", "lui", "lei", "noi", "voi", "loro", "mi", "ti", "si", "ci", "vi",
        "questo", "quello", "mio", "tuo", "suo",
    ],
    verb_markers: &[
        "è", "sono", "era", "erano", "sei", "siamo", "siete", "ho", "hai", "ha", "abbiamo",
        "avete", "hanno", "posso", "puoi", "può", "voglio", "vuoi", "so", "sai", "parlo",
        "parla", "aiuto", "aiuta", "serve", "piace",
    ],
};

/// Spoken phrases that ask the assistant to stop talking.
const INTERRUPT_WORDS: &[&str] = &["stop", "wait", "pause", "silence", "enough"];
const INTERRUPT_PHRASES: &[&str] = &["hold on", "stop talking"];

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphabetic() || c == '\'' || c == '’' || c == '-'))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Identifies the source language by scanning for lexical markers, checking
/// Spanish, French, German and Italian in that order and falling back to
/// English.
pub fn detect_language(text: &str) -> Language {
    let toks = tokens(text);
    for lang in [Language::Es, Language::Fr, Language::De, Language::It] {
        let markers = lang.profile().detection_markers;
        if toks.iter().any(|t| contains_word(markers, t)) {
            return lang;
        }
    }
    Language::En
}

/// Judges whether a finalized transcript reads as a finished utterance.
///
/// Pass `None` to auto-detect the language. Accepts short acknowledgements
/// outright; everything else must end in terminal punctuation, must not end
/// on a dangling function word, and must contain at least one subject-like
/// and one verb-like token.
pub fn is_complete(text: &str, language: Option<Language>) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let lang = language.unwrap_or_else(|| detect_language(trimmed));
    let profile = lang.profile();

    let lowered = trimmed.to_lowercase();
    let bare = lowered.strip_suffix('.').unwrap_or(&lowered);
    if contains_word(profile.short_acknowledgements, bare) {
        return true;
    }

    if !trimmed.ends_with(['.', '!', '?']) {
        return false;
    }

    let toks = tokens(trimmed.trim_end_matches(['.', '!', '?']));
    let Some(last) = toks.last() else {
        return false;
    };
    if contains_word(profile.dangling_enders, last) {
        return false;
    }

    let has_subject = toks.iter().any(|t| profile.is_subject_like(t));
    let has_verb = toks.iter().any(|t| profile.is_verb_like(t));
    has_subject && has_verb && trimmed.chars().count() >= 3
}

/// Whether the text contains a spoken interruption request.
pub fn is_interrupt(text: &str) -> bool {
    let lowered = text.to_lowercase();
    if INTERRUPT_PHRASES.iter().any(|p| lowered.contains(p)) {
        return true;
    }
    let toks = tokens(&lowered);
    toks.iter().any(|t| contains_word(INTERRUPT_WORDS, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_acknowledgement_is_complete() {
        assert!(is_complete("ok.", None));
        assert!(is_complete("yes", None));
        assert!(is_complete("Okay", None));
        assert!(is_complete("sí", None));
    }

    #[test]
    fn dangling_infinitive_is_incomplete() {
        assert!(!is_complete("I want to", None));
        assert!(!is_complete("I want to.", None));
    }

    #[test]
    fn full_question_is_complete() {
        assert!(is_complete("Hello, how are you?", None));
        assert!(is_complete("Tell me more about that.", None));
    }

    #[test]
    fn empty_or_trailing_conjunction_is_incomplete() {
        assert!(!is_complete("", None));
        assert!(!is_complete("   ", None));
        assert!(!is_complete("We can talk when.", None));
        assert!(!is_complete("So what I was thinking is", None));
    }

    #[test]
    fn missing_verb_is_incomplete() {
        assert!(!is_complete("The red house on the hill.", None));
    }

    #[test]
    fn detects_marker_languages_in_priority_order() {
        assert_eq!(detect_language("el perro es grande"), Language::Es);
        assert_eq!(detect_language("merci, c'est bonjour pour moi"), Language::Fr);
        assert_eq!(detect_language("danke, das ist gut"), Language::De);
        assert_eq!(detect_language("grazie, va bene"), Language::It);
        assert_eq!(detect_language("hello there friend"), Language::En);
    }

    #[test]
    fn declared_language_skips_detection() {
        assert!(is_complete("ja", Some(Language::De)));
        assert!(!is_complete("und", Some(Language::De)));
    }

    #[test]
    fn interrupt_phrases() {
        assert!(is_interrupt("please stop talking"));
        assert!(is_interrupt("Wait"));
        assert!(is_interrupt("could you hold on a second"));
        assert!(!is_interrupt("I was waiting for the bus"));
        assert!(!is_interrupt("tell me a story"));
    }

    #[test]
    fn language_codes_round_trip() {
        for lang in [Language::En, Language::Es, Language::Fr, Language::De, Language::It] {
            assert_eq!(Language::parse(lang.code()), Some(lang));
        }
        assert_eq!(Language::parse("zz"), None);
    }
}
