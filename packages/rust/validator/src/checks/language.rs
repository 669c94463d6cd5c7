//! Language plausibility: tag syntax, declared-language agreement and, for
//! Indic and Urdu tags, the share of text written in the expected script.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;

use feedscout_shared::ReasonCode;

use super::{CheckContext, CheckFailure, QualityCheck};

/// `xx` or `xxx` primary subtag, then optional `-subtag` parts.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{1,8})*$").expect("language tag regex")
});

/// English language names seen in publisher metadata.
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("english", "en"),
    ("hindi", "hi"),
    ("telugu", "te"),
    ("tamil", "ta"),
    ("marathi", "mr"),
    ("gujarati", "gu"),
    ("kannada", "kn"),
    ("malayalam", "ml"),
    ("bengali", "bn"),
    ("bangla", "bn"),
    ("punjabi", "pa"),
    ("assamese", "as"),
    ("odia", "or"),
    ("oriya", "or"),
    ("urdu", "ur"),
    ("nepali", "ne"),
    ("sanskrit", "sa"),
];

/// Resolve a language tag or English language name to a lower-cased tag.
///
/// Returns `None` when the value is neither a known name nor a
/// syntactically valid tag.
pub fn language_tag_for(value: &str) -> Option<String> {
    let value = value.trim();
    let lower = value.to_ascii_lowercase();
    if let Some((_, tag)) = LANGUAGE_NAMES.iter().find(|(name, _)| *name == lower) {
        return Some((*tag).to_string());
    }
    TAG_RE.is_match(value).then_some(lower)
}

fn primary_subtag(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// Unicode block the body of a document in `primary` is expected to use.
fn expected_script(primary: &str) -> Option<(&'static str, RangeInclusive<char>)> {
    let script = match primary {
        "hi" | "mr" | "ne" | "sa" => ("Devanagari", '\u{0900}'..='\u{097F}'),
        "bn" | "as" => ("Bengali", '\u{0980}'..='\u{09FF}'),
        "pa" => ("Gurmukhi", '\u{0A00}'..='\u{0A7F}'),
        "gu" => ("Gujarati", '\u{0A80}'..='\u{0AFF}'),
        "or" => ("Odia", '\u{0B00}'..='\u{0B7F}'),
        "ta" => ("Tamil", '\u{0B80}'..='\u{0BFF}'),
        "te" => ("Telugu", '\u{0C00}'..='\u{0C7F}'),
        "kn" => ("Kannada", '\u{0C80}'..='\u{0CFF}'),
        "ml" => ("Malayalam", '\u{0D00}'..='\u{0D7F}'),
        "ur" => ("Arabic", '\u{0600}'..='\u{06FF}'),
        _ => return None,
    };
    Some(script)
}

/// Share of alphabetic characters inside `range`; `None` when there are none.
fn script_ratio(text: &str, range: &RangeInclusive<char>) -> Option<f64> {
    let (mut alphabetic, mut in_script) = (0usize, 0usize);
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        alphabetic += 1;
        if range.contains(&c) {
            in_script += 1;
        }
    }
    (alphabetic > 0).then(|| in_script as f64 / alphabetic as f64)
}

#[derive(Debug, Clone, Copy)]
pub struct LanguageCheck {
    min_script_ratio: f64,
}

impl LanguageCheck {
    pub fn new(min_script_ratio: f64) -> Self {
        Self { min_script_ratio }
    }
}

impl QualityCheck for LanguageCheck {
    fn check(&self, ctx: &CheckContext<'_>) -> Result<(), CheckFailure> {
        let declared = &ctx.candidate.language;
        let Some(tag) = language_tag_for(declared) else {
            return Err(CheckFailure::new(
                ReasonCode::LanguageImplausible,
                format!("invalid language tag '{declared}'"),
            ));
        };
        let primary = primary_subtag(&tag);

        if let Some(doc_lang) = ctx.document.language.as_deref() {
            match language_tag_for(doc_lang) {
                Some(doc_tag) if primary_subtag(&doc_tag) != primary => {
                    return Err(CheckFailure::new(
                        ReasonCode::LanguageImplausible,
                        format!("document declares '{doc_lang}', expected '{tag}'"),
                    ));
                }
                Some(_) => {}
                None => tracing::debug!(doc_lang, "unrecognised document language ignored"),
            }
        }

        let Some((script, range)) = expected_script(primary) else {
            return Ok(());
        };
        let text = format!("{} {}", ctx.document.title, ctx.document.body);
        match script_ratio(&text, &range) {
            Some(ratio) if ratio >= self.min_script_ratio => Ok(()),
            Some(ratio) => Err(CheckFailure::new(
                ReasonCode::LanguageImplausible,
                format!(
                    "{:.0}% {script} text, need {:.0}%",
                    ratio * 100.0,
                    self.min_script_ratio * 100.0
                ),
            )),
            None => Err(CheckFailure::new(
                ReasonCode::LanguageImplausible,
                format!("no alphabetic text to confirm {script} script"),
            )),
        }
    }

    fn name(&self) -> &str {
        "language"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{candidate, document};
    use feedscout_normalize::Document;

    const HINDI: &str = "केंद्रीय मंत्रिमंडल ने आज नई शिक्षा योजना को मंजूरी दी";
    const URDU: &str = "مرکزی کابینہ نے آج نئی اسکیم کو منظوری دی";

    fn run(language: &str, doc: &Document) -> Result<(), CheckFailure> {
        let cand = candidate(language);
        LanguageCheck::new(0.2).check(&CheckContext {
            candidate: &cand,
            document: doc,
            content_hash: "h",
        })
    }

    #[test]
    fn tag_resolution() {
        assert_eq!(language_tag_for("hi").as_deref(), Some("hi"));
        assert_eq!(language_tag_for("en-IN").as_deref(), Some("en-in"));
        assert_eq!(language_tag_for("Hindi").as_deref(), Some("hi"));
        assert_eq!(language_tag_for(" Odia ").as_deref(), Some("or"));
        assert_eq!(language_tag_for("h1"), None);
        assert_eq!(language_tag_for("english please"), None);
    }

    #[test]
    fn hindi_text_passes_for_hi() {
        assert!(run("hi", &document(HINDI, Some("hi-IN"))).is_ok());
        assert!(run("Hindi", &document(HINDI, None)).is_ok());
    }

    #[test]
    fn latin_text_fails_for_hi() {
        let failure = run("hi", &document("Cabinet approves the scheme", None)).unwrap_err();
        assert_eq!(failure.reason, ReasonCode::LanguageImplausible);
        assert!(failure.detail.contains("Devanagari"));
    }

    #[test]
    fn mixed_text_above_ratio_passes() {
        let body = format!("{HINDI} PIB Delhi press release");
        assert!(run("hi", &document(&body, None)).is_ok());
    }

    #[test]
    fn urdu_uses_arabic_script() {
        assert!(run("ur", &document(URDU, None)).is_ok());
        assert!(run("ur", &document(HINDI, None)).is_err());
    }

    #[test]
    fn declared_language_must_agree() {
        let failure = run("ta", &document("anything", Some("en-us"))).unwrap_err();
        assert!(failure.detail.contains("en-us"));
        assert!(run("en-IN", &document("Press release", Some("en-US"))).is_ok());
        assert!(run("en", &document("Press release", Some("English"))).is_ok());
    }

    #[test]
    fn unknown_document_language_ignored() {
        assert!(run("en", &document("Press release", Some("??"))).is_ok());
    }

    #[test]
    fn invalid_candidate_tag_fails() {
        let failure = run("not a tag", &document("text", None)).unwrap_err();
        assert_eq!(failure.reason, ReasonCode::LanguageImplausible);
    }

    #[test]
    fn no_alphabetic_text_fails_for_script_languages() {
        assert!(run("te", &document("2024 - 12345 !!", None)).is_err());
    }

    #[test]
    fn latin_languages_skip_script_check() {
        assert!(run("en", &document(HINDI, None)).is_ok());
    }
}
