//! Seed inputs: the externally supplied hint list.
//!
//! A seed list file is line oriented:
//! - `# comment` lines and blank lines are ignored
//! - `## Category` starts a section; following seeds default to that category
//! - `url [lang=xx] [category=yy]` declares one seed
//! - `- [Name](url): xx` declares one seed in link form, `xx` being the language

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use feedscout_shared::{FeedScoutError, Result, Seed, parse_source_url};

const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_CATEGORY: &str = "general";

/// Supplies this run's hint seeds.
pub trait SeedSource: Send + Sync {
    fn seeds(&self) -> Result<Vec<Seed>>;
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Seeds held in memory, typically the config file's `[[seeds]]`.
#[derive(Debug, Clone, Default)]
pub struct StaticSeeds(pub Vec<Seed>);

impl SeedSource for StaticSeeds {
    fn seeds(&self) -> Result<Vec<Seed>> {
        for seed in &self.0 {
            parse_source_url(&seed.url).map_err(|e| {
                FeedScoutError::config(format!("invalid seed URL '{}': {e}", seed.url))
            })?;
        }
        Ok(self.0.clone())
    }
}

/// Seeds read from a seed list file on every run.
#[derive(Debug, Clone)]
pub struct SeedFile {
    path: PathBuf,
}

impl SeedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeedSource for SeedFile {
    fn seeds(&self) -> Result<Vec<Seed>> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| FeedScoutError::io(&self.path, e))?;
        parse_seed_list(&content).map_err(|e| {
            FeedScoutError::config(format!("seed list {}: {e}", self.path.display()))
        })
    }
}

/// Several seed sources read in order.
#[derive(Clone, Default)]
pub struct ChainedSeeds(pub Vec<Arc<dyn SeedSource>>);

impl SeedSource for ChainedSeeds {
    fn seeds(&self) -> Result<Vec<Seed>> {
        let mut all = Vec::new();
        for source in &self.0 {
            all.extend(source.seeds()?);
        }
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches `## Section Title`.
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+(.+)$").expect("section regex"));

/// Matches `- [Name](url)` or `- [Name](url): lang`.
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*]\s+\[([^\]]+)\]\(([^)\s]+)\)(?::\s*(\S+))?\s*$").expect("link regex")
});

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a seed list. Every URL is validated; errors name the offending line.
pub fn parse_seed_list(content: &str) -> Result<Vec<Seed>> {
    let mut seeds = Vec::new();
    let mut section: Option<String> = None;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = SECTION_RE.captures(trimmed) {
            section = Some(slug(&caps[1]));
            continue;
        }

        if trimmed.starts_with('#') {
            continue;
        }

        let category = section.clone().unwrap_or_else(|| DEFAULT_CATEGORY.into());

        if let Some(caps) = LINK_RE.captures(trimmed) {
            let url = caps[2].trim();
            check_url(url, line_no)?;
            seeds.push(Seed {
                url: url.to_string(),
                language: caps
                    .get(3)
                    .map(|m| m.as_str().trim_start_matches("lang=").to_string())
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.into()),
                category,
            });
            continue;
        }

        seeds.push(parse_plain_line(trimmed, line_no, category)?);
    }

    Ok(seeds)
}

fn parse_plain_line(line: &str, line_no: usize, category: String) -> Result<Seed> {
    let mut parts = line.split_whitespace();
    let url = parts.next().unwrap_or_default();
    check_url(url, line_no)?;

    let mut seed = Seed {
        url: url.to_string(),
        language: DEFAULT_LANGUAGE.into(),
        category,
    };

    for attr in parts {
        match attr.split_once('=') {
            Some(("lang" | "language", value)) if !value.is_empty() => {
                seed.language = value.to_string();
            }
            Some(("category", value)) if !value.is_empty() => seed.category = slug(value),
            _ => {
                return Err(FeedScoutError::parse(format!(
                    "line {line_no}: unrecognised attribute '{attr}'"
                )));
            }
        }
    }

    Ok(seed)
}

fn check_url(url: &str, line_no: usize) -> Result<()> {
    parse_source_url(url)
        .map(|_| ())
        .map_err(|e| FeedScoutError::parse(format!("line {line_no}: {e}")))
}

fn slug(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
