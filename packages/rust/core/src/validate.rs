//! Generated-skill validation.
//!
//! Checks a skill directory produced by the external workflow: SKILL.md must
//! exist, carry YAML frontmatter with `name:` and `description:`, the name
//! must match the directory slug, and oversized skill files are flagged so
//! content gets moved into `references/`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use skillforge_shared::{Result, SkillForgeError};

/// Skill files longer than this should move content into `references/`.
pub const MAX_SKILL_LINES: usize = 500;

/// One named pass/fail check.
#[derive(Debug, Clone)]
pub struct SkillCheck {
    pub name: &'static str,
    pub passed: bool,
}

/// Outcome of validating one skill directory.
#[derive(Debug)]
pub struct SkillValidation {
    pub skill_dir: PathBuf,
    /// Directory slug the skill is expected to be named after.
    pub skill_name: String,
    pub checks: Vec<SkillCheck>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl SkillValidation {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.errors.is_empty()
    }
}

/// Run all checks against a skill directory.
///
/// Check failures are reported in the returned [`SkillValidation`]; only a
/// path that cannot name a skill at all is an error here.
pub fn validate_skill(skill_dir: &Path) -> Result<SkillValidation> {
    let skill_name = skill_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            SkillForgeError::validation(format!(
                "cannot derive a skill name from {}",
                skill_dir.display()
            ))
        })?;

    info!(skill = %skill_name, "validating skill directory");

    let mut checks = Vec::new();
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let skill_file = skill_dir.join("SKILL.md");
    let exists = skill_file.is_file();
    checks.push(SkillCheck {
        name: "skill_file_exists",
        passed: exists,
    });
    if !exists {
        errors.push(format!("SKILL.md not found at {}", skill_file.display()));
        return Ok(SkillValidation {
            skill_dir: skill_dir.to_path_buf(),
            skill_name,
            checks,
            warnings,
            errors,
        });
    }

    let content =
        std::fs::read_to_string(&skill_file).map_err(|e| SkillForgeError::io(&skill_file, e))?;

    let frontmatter = parse_frontmatter(&content);
    checks.push(SkillCheck {
        name: "valid_frontmatter",
        passed: frontmatter.is_some(),
    });

    match &frontmatter {
        Some(fm) => {
            let matches = fm.name == skill_name;
            checks.push(SkillCheck {
                name: "name_matches_directory",
                passed: matches,
            });
            if !matches {
                errors.push(format!(
                    "frontmatter name '{}' does not match directory '{}'",
                    fm.name, skill_name
                ));
            }
        }
        None => {
            errors.push("missing or invalid YAML frontmatter in SKILL.md".into());
        }
    }

    let line_count = content.lines().count();
    let size_ok = line_count <= MAX_SKILL_LINES;
    checks.push(SkillCheck {
        name: "file_size_ok",
        passed: size_ok,
    });
    if !size_ok {
        warnings.push(format!(
            "SKILL.md has {line_count} lines (over {MAX_SKILL_LINES}), move content to references/"
        ));
    }

    Ok(SkillValidation {
        skill_dir: skill_dir.to_path_buf(),
        skill_name,
        checks,
        warnings,
        errors,
    })
}

/// Parsed SKILL.md frontmatter fields.
#[derive(Debug)]
struct Frontmatter {
    name: String,
}

/// Matches the leading `---` YAML block.
static FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A---\s*\n(.*?)\n---").expect("frontmatter regex")
});

/// Matches a `name: value` entry.
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^name:\s*(\S+)").expect("name regex")
});

/// Matches a non-empty `description:` entry.
static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^description:\s*\S").expect("description regex")
});

/// Extract the leading `---` YAML block and require `name:` and
/// `description:` entries in it.
fn parse_frontmatter(content: &str) -> Option<Frontmatter> {
    let block = FRONTMATTER_RE.captures(content)?.get(1)?.as_str();
    let name = NAME_RE.captures(block)?.get(1)?.as_str().to_string();
    DESCRIPTION_RE.is_match(block).then_some(Frontmatter { name })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_skill(name: &str, skill_md: Option<&str>) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("sf-validate-test-{}", uuid::Uuid::now_v7()))
            .join(name);
        std::fs::create_dir_all(&dir).unwrap();
        if let Some(content) = skill_md {
            std::fs::write(dir.join("SKILL.md"), content).unwrap();
        }
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }

    fn check(validation: &SkillValidation, name: &str) -> bool {
        validation
            .checks
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.passed)
            .unwrap_or_else(|| panic!("missing check {name}"))
    }

    #[test]
    fn well_formed_skill_passes() {
        let dir = temp_skill(
            "fastapi-developer",
            Some(
                "---\nname: fastapi-developer\ndescription: Build FastAPI services.\n---\n\n# FastAPI\n",
            ),
        );

        let v = validate_skill(&dir).unwrap();
        assert!(v.all_passed(), "errors: {:?}", v.errors);
        assert!(v.warnings.is_empty());
        assert_eq!(v.skill_name, "fastapi-developer");

        cleanup(&dir);
    }

    #[test]
    fn missing_skill_file_fails() {
        let dir = temp_skill("empty-skill", None);

        let v = validate_skill(&dir).unwrap();
        assert!(!v.all_passed());
        assert!(!check(&v, "skill_file_exists"));
        assert!(v.errors[0].contains("SKILL.md not found"));

        cleanup(&dir);
    }

    #[test]
    fn missing_frontmatter_fails() {
        let dir = temp_skill("no-frontmatter", Some("# Just a heading\n"));

        let v = validate_skill(&dir).unwrap();
        assert!(!check(&v, "valid_frontmatter"));
        assert!(!v.all_passed());

        cleanup(&dir);
    }

    #[test]
    fn frontmatter_without_description_fails() {
        let dir = temp_skill("half-skill", Some("---\nname: half-skill\n---\n# Body\n"));

        let v = validate_skill(&dir).unwrap();
        assert!(!check(&v, "valid_frontmatter"));

        cleanup(&dir);
    }

    #[test]
    fn name_mismatch_fails() {
        let dir = temp_skill(
            "actual-dir",
            Some("---\nname: other-name\ndescription: Mismatch.\n---\n"),
        );

        let v = validate_skill(&dir).unwrap();
        assert!(check(&v, "valid_frontmatter"));
        assert!(!check(&v, "name_matches_directory"));
        assert!(v.errors[0].contains("does not match"));

        cleanup(&dir);
    }

    #[test]
    fn oversized_skill_warns() {
        let body = "line\n".repeat(MAX_SKILL_LINES + 10);
        let content = format!("---\nname: big-skill\ndescription: Large.\n---\n{body}");
        let dir = temp_skill("big-skill", Some(&content));

        let v = validate_skill(&dir).unwrap();
        assert!(!check(&v, "file_size_ok"));
        assert!(!v.all_passed());
        assert!(v.warnings[0].contains("references/"));

        cleanup(&dir);
    }
}
