//! Skills
//!
//! A skill is a named set of instructions stored on disk that replaces the
//! generic writer preamble. Skills are selected explicitly with a leading
//! `/name` or matched semantically against the catalog.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod matcher;
mod store;

pub use matcher::{MATCH_MAX_TOKENS, MATCH_TEMPERATURE, MIN_CONFIDENCE, SemanticMatcher, parse_match_reply};
pub use store::{FsSkillStore, SKILL_FILE, split_frontmatter};

/// Errors from the skill store
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("Skill not found: {0}")]
    NotFound(String),

    #[error("Invalid skill frontmatter: {0}")]
    Frontmatter(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Catalog entry for a skill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillMetadata {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
}

/// A skill with its instruction body loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    pub meta: SkillMetadata,
    pub body: String,
}

impl Skill {
    pub fn name(&self) -> &str {
        &self.meta.name
    }
}

/// Read-only skill catalog
pub trait SkillStore: Send + Sync {
    fn get(&self, name: &str) -> Option<SkillMetadata>;

    /// All skills, sorted by name
    fn list(&self) -> Vec<SkillMetadata>;

    fn load_full(&self, meta: &SkillMetadata) -> Result<Skill, SkillError>;
}

/// How a skill was chosen
#[derive(Debug, Clone, PartialEq)]
pub enum SkillSource {
    Explicit,
    Semantic { confidence: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSkill {
    pub skill: Skill,
    pub source: SkillSource,
}

/// Outcome of skill resolution for one instruction
#[derive(Debug, Clone, PartialEq)]
pub struct SkillResolution {
    pub skill: Option<ResolvedSkill>,
    /// The instruction with any `/name` prefix removed
    pub instruction: String,
}

/// Split `/name rest` into the name and the remainder
pub fn parse_explicit(instruction: &str) -> Option<(&str, &str)> {
    let rest = instruction.trim_start().strip_prefix('/')?;
    let (name, remainder) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim()),
        None => (rest, ""),
    };
    (!name.is_empty()).then_some((name, remainder))
}

/// Selects the skill for a turn
pub struct SkillResolver {
    store: Arc<dyn SkillStore>,
    matcher: Option<SemanticMatcher>,
}

impl SkillResolver {
    /// `matcher` is `None` when auto-matching is disabled
    pub fn new(store: Arc<dyn SkillStore>, matcher: Option<SemanticMatcher>) -> Self {
        debug!(auto_match = %matcher.is_some(), "SkillResolver::new: called");
        Self { store, matcher }
    }

    pub fn store(&self) -> &Arc<dyn SkillStore> {
        &self.store
    }

    /// Resolve the skill for `instruction`
    ///
    /// An explicit `/name` always wins. Semantic matching only runs when no
    /// skill is active yet. Never fails: load and model errors mean no skill,
    /// and so does cancellation of the matching call.
    pub async fn resolve(&self, instruction: &str, skill_active: bool, cancel: &CancellationToken) -> SkillResolution {
        debug!(%instruction, %skill_active, "SkillResolver::resolve: called");

        if let Some((name, rest)) = parse_explicit(instruction)
            && let Some(meta) = self.store.get(name)
        {
            let instruction = if rest.is_empty() {
                format!("Apply the {} skill", meta.name)
            } else {
                rest.to_string()
            };
            return SkillResolution {
                skill: self.load(&meta, SkillSource::Explicit),
                instruction,
            };
        }

        let mut resolution = SkillResolution {
            skill: None,
            instruction: instruction.to_string(),
        };
        if skill_active || cancel.is_cancelled() {
            return resolution;
        }
        let Some(matcher) = &self.matcher else {
            return resolution;
        };

        let catalog = self.store.list();
        if catalog.is_empty() {
            debug!("SkillResolver::resolve: empty catalog");
            return resolution;
        }

        if let Some((name, confidence)) = matcher.best_match(instruction, &catalog, cancel).await
            && let Some(meta) = catalog.iter().find(|m| m.name == name)
        {
            info!(%name, %confidence, "Matched skill");
            resolution.skill = self.load(meta, SkillSource::Semantic { confidence });
        }
        resolution
    }

    fn load(&self, meta: &SkillMetadata, source: SkillSource) -> Option<ResolvedSkill> {
        match self.store.load_full(meta) {
            Ok(skill) => Some(ResolvedSkill { skill, source }),
            Err(e) => {
                warn!(name = %meta.name, error = %e, "SkillResolver::load: failed to load skill");
                None
            }
        }
    }
}
