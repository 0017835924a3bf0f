//! Project scaffolding for the `init` command.
//!
//! Copies the starter files the external workflow expects into a target
//! project: a config stub and a skill template under the default artifact
//! location. Existing files are never overwritten; the whole init is refused
//! if any target already exists.

use std::path::{Path, PathBuf};

use tracing::info;

use skillforge_shared::{AppConfig, Result, SkillForgeError};

const CONFIG_STUB_NAME: &str = "skillforge.toml";
const TEMPLATE_DIR: &str = ".roo/skills/_template";

const SKILL_TEMPLATE: &str = "\
---
name: skill-name
description: One-line description of what this skill covers.
---

# Skill Name

## Overview

Describe what the skill does and when an agent should reach for it.

## Usage

Concrete, runnable guidance. Keep this file short; details belong in
references/.
";

const REFERENCE_TEMPLATE: &str = "\
# Getting Started

Longer-form material the skill links to. One topic per file.
";

const LICENSE_TEMPLATE: &str = "\
MIT License

Copyright (c) the skill authors.

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the \"Software\"), to
deal in the Software without restriction.
";

/// Write the starter layout into `target`. Returns the created paths.
///
/// Fails with a validation error, before writing anything, if any target
/// file already exists.
pub fn init_project(target: &Path) -> Result<Vec<PathBuf>> {
    let config = AppConfig::default();
    let config_stub = toml::to_string_pretty(&config)
        .map_err(|e| SkillForgeError::config(format!("config template serialization: {e}")))?;

    let template_dir = target.join(TEMPLATE_DIR);
    let files: Vec<(PathBuf, String)> = vec![
        (target.join(CONFIG_STUB_NAME), config_stub),
        (template_dir.join("SKILL.md"), SKILL_TEMPLATE.to_string()),
        (
            template_dir.join("references/getting-started.md"),
            REFERENCE_TEMPLATE.to_string(),
        ),
        (template_dir.join("LICENSE.txt"), LICENSE_TEMPLATE.to_string()),
    ];

    for (path, _) in &files {
        if path.exists() {
            return Err(SkillForgeError::validation(format!(
                "refusing to overwrite existing {}",
                path.display()
            )));
        }
    }

    let mut created = Vec::with_capacity(files.len());
    for (path, content) in files {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SkillForgeError::io(parent, e))?;
        }
        std::fs::write(&path, content).map_err(|e| SkillForgeError::io(&path, e))?;
        info!(path = %path.display(), "wrote starter file");
        created.push(path);
    }

    Ok(created)
}
