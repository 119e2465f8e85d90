//! File-backed skill catalog
//!
//! Layout: `<skills-dir>/<name>/SKILL.md`, each file starting with a YAML
//! frontmatter block:
//!
//! ```text
//! ---
//! name: memo
//! description: Turn documents into one-page business memos
//! ---
//! Instructions for the model...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Skill, SkillError, SkillMetadata, SkillStore};

pub const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
}

/// Split a skill file into (frontmatter, body)
///
/// The frontmatter is the block between a leading `---` line and the next
/// `---` line. Without one, the whole file is the body.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content.trim());
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(front), body.trim());
        }
        offset += line.len();
    }
    // Unterminated frontmatter: treat everything as body
    (None, content.trim())
}

/// Skills read from a directory tree, indexed by name at open time
pub struct FsSkillStore {
    dir: PathBuf,
    skills: BTreeMap<String, SkillMetadata>,
}

impl FsSkillStore {
    /// Scan `dir` for skills; a missing directory is an empty catalog
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SkillError> {
        let dir = dir.into();
        debug!(?dir, "FsSkillStore::open: called");
        let mut skills = BTreeMap::new();

        if !dir.is_dir() {
            debug!("FsSkillStore::open: no skills directory");
            return Ok(Self { dir, skills });
        }

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path().join(SKILL_FILE);
            if !entry.file_type()?.is_dir() || !path.is_file() {
                continue;
            }

            let fallback = entry.file_name().to_string_lossy().into_owned();
            match Self::load_metadata(&path, &fallback) {
                Ok(meta) => {
                    debug!(name = %meta.name, "FsSkillStore::open: indexed skill");
                    skills.insert(meta.name.clone(), meta);
                }
                Err(e) => warn!(?path, error = %e, "FsSkillStore::open: skipping invalid skill"),
            }
        }

        info!("Loaded {} skills from {}", skills.len(), dir.display());
        Ok(Self { dir, skills })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load_metadata(path: &Path, fallback_name: &str) -> Result<SkillMetadata, SkillError> {
        let content = std::fs::read_to_string(path)?;
        let front = match split_frontmatter(&content).0 {
            Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str::<Frontmatter>(yaml)?,
            _ => Frontmatter::default(),
        };

        Ok(SkillMetadata {
            name: front
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| fallback_name.to_string()),
            description: front.description.unwrap_or_default().trim().to_string(),
            path: path.to_path_buf(),
        })
    }
}

impl SkillStore for FsSkillStore {
    fn get(&self, name: &str) -> Option<SkillMetadata> {
        self.skills.get(name).cloned()
    }

    fn list(&self) -> Vec<SkillMetadata> {
        self.skills.values().cloned().collect()
    }

    fn load_full(&self, meta: &SkillMetadata) -> Result<Skill, SkillError> {
        debug!(name = %meta.name, "FsSkillStore::load_full: called");
        if !self.skills.contains_key(&meta.name) {
            return Err(SkillError::NotFound(meta.name.clone()));
        }
        let content = std::fs::read_to_string(&meta.path)?;
        let body = split_frontmatter(&content).1.to_string();
        Ok(Skill {
            meta: meta.clone(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_skill(root: &Path, dir: &str, content: &str) {
        let skill_dir = root.join(dir);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join(SKILL_FILE), content).unwrap();
    }

    #[test]
    fn test_split_frontmatter() {
        let (front, body) = split_frontmatter("---\nname: a\n---\n\nBody here.\n");
        assert_eq!(front, Some("name: a\n"));
        assert_eq!(body, "Body here.");
    }

    #[test]
    fn test_split_without_frontmatter() {
        assert_eq!(split_frontmatter("Just text"), (None, "Just text"));
        assert_eq!(split_frontmatter("---\nnever closed"), (None, "---\nnever closed"));
    }

    #[test]
    fn test_body_may_contain_rules() {
        let (_, body) = split_frontmatter("---\nname: a\n---\nPart one\n---\nPart two");
        assert_eq!(body, "Part one\n---\nPart two");
    }

    #[test]
    fn test_open_indexes_skills() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "memo",
            "---\nname: memo\ndescription: One-page memos\n---\nWrite a memo.",
        );
        write_skill(dir.path(), "haiku", "---\ndescription: Verse\n---\nAnswer in haiku.");
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("stray.md"), "not a skill").unwrap();

        let store = FsSkillStore::open(dir.path()).unwrap();
        let names: Vec<String> = store.list().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["haiku", "memo"]);

        let memo = store.get("memo").unwrap();
        assert_eq!(memo.description, "One-page memos");

        // Name falls back to the directory
        assert_eq!(store.get("haiku").unwrap().description, "Verse");
        assert!(store.get("empty").is_none());
    }

    #[test]
    fn test_invalid_frontmatter_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "bad", "---\nname: [unclosed\n---\nBody");
        write_skill(dir.path(), "good", "---\nname: good\n---\nBody");

        let store = FsSkillStore::open(dir.path()).unwrap();
        assert_eq!(store.list().len(), 1);
        assert!(store.get("good").is_some());
    }

    #[test]
    fn test_load_full_reads_body() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "memo", "---\nname: memo\n---\n\nWrite a memo.\n");

        let store = FsSkillStore::open(dir.path()).unwrap();
        let skill = store.load_full(&store.get("memo").unwrap()).unwrap();
        assert_eq!(skill.body, "Write a memo.");
        assert_eq!(skill.meta.name, "memo");
    }

    #[test]
    fn test_load_full_unknown_skill() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSkillStore::open(dir.path()).unwrap();
        let meta = SkillMetadata {
            name: "ghost".to_string(),
            description: String::new(),
            path: dir.path().join("ghost").join(SKILL_FILE),
        };
        assert!(matches!(store.load_full(&meta), Err(SkillError::NotFound(_))));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let store = FsSkillStore::open("/nonexistent/pulp/skills").unwrap();
        assert!(store.list().is_empty());
    }
}
