//! Descriptor file parsing and validation.
//!
//! Handles the frontmatter format shared by skills, droids and commands: YAML
//! delimited by `---` followed by a markdown body of instructions. The body is
//! carried as an opaque payload and never inspected.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, bail};
use capsmith_types::descriptor::{Descriptor, DescriptorKind, DescriptorManifest, Operation};

/// Version assigned to descriptors that do not declare one.
pub const DEFAULT_VERSION: &str = "0.1.0";

/// Cost assigned to descriptors that do not declare one.
pub const DEFAULT_COST: f64 = 1.0;

/// Extract YAML frontmatter and markdown body from a descriptor file.
///
/// Content must start with `---`, and a closing `\n---` separates the YAML
/// from the body. Returns `(yaml_str, body_str)` where body has leading
/// blank lines trimmed.
pub fn extract_frontmatter(content: &str) -> anyhow::Result<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    if !content.starts_with("---") {
        bail!("descriptor must start with YAML frontmatter delimiter '---'");
    }

    let after_open = &content[3..];
    let after_open = after_open
        .strip_prefix("\r\n")
        .or_else(|| after_open.strip_prefix('\n'))
        .unwrap_or(after_open);

    let (yaml_str, remainder) = if let Some(rest) = after_open.strip_prefix("---") {
        ("", rest)
    } else {
        let closing_pos = after_open
            .find("\n---")
            .context("descriptor missing closing frontmatter delimiter '---'")?;
        (&after_open[..closing_pos], &after_open[closing_pos + 4..])
    };

    let body_str = remainder
        .strip_prefix("\r\n")
        .or_else(|| remainder.strip_prefix('\n'))
        .unwrap_or(remainder)
        .trim_start_matches(['\n', '\r']);

    Ok((yaml_str, body_str))
}

/// Parse a descriptor file into its manifest and body.
pub fn parse_descriptor_md(content: &str) -> anyhow::Result<(DescriptorManifest, String)> {
    let (yaml_str, body_str) = extract_frontmatter(content)?;

    let manifest: DescriptorManifest = if yaml_str.trim().is_empty() {
        DescriptorManifest::default()
    } else {
        serde_yaml_ng::from_str(yaml_str).context("failed to parse YAML frontmatter")?
    };

    Ok((manifest, body_str.to_owned()))
}

/// Whether `id` is a well-formed descriptor identifier: lowercase ASCII
/// letters, digits, `-` and `_`, not starting or ending with a separator.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        && !id.starts_with(['-', '_'])
        && !id.ends_with(['-', '_'])
}

/// Derive an id from a file stem or relative path segment list.
///
/// Lowercases, maps whitespace, `/` and `.` to `-`, and drops anything else
/// that is not a valid id character.
pub fn derive_id<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let joined = segments
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let mut id = String::with_capacity(joined.len());
    for c in joined.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            id.push(c);
        } else if (c == '-' || c.is_whitespace() || c == '.' || c == '/') && !id.ends_with('-') {
            id.push('-');
        }
    }
    id.trim_matches(['-', '_']).to_owned()
}

/// Build a normalized [`Descriptor`] from a parsed manifest.
///
/// `fallback_id` is used when the frontmatter carries no `id`. Extension keys
/// found at the top level take precedence over the same keys under
/// `metadata`. Tool names from `allowed-tools` are folded into the declared
/// operations.
pub fn normalize(
    manifest: DescriptorManifest,
    body: String,
    kind: DescriptorKind,
    fallback_id: &str,
    source: Option<&Path>,
) -> anyhow::Result<Descriptor> {
    let DescriptorManifest {
        id,
        name,
        description,
        version,
        tags,
        depends_on,
        conflicts_with,
        conflict_class,
        cost,
        allowed_operations,
        allowed_tools,
        metadata,
    } = manifest;
    let meta = metadata.unwrap_or_default();

    let id = id.unwrap_or_else(|| fallback_id.to_owned());
    let name = name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| id.clone());

    let version_str = version
        .or(meta.version)
        .unwrap_or_else(|| DEFAULT_VERSION.to_owned());
    let trimmed = version_str.trim();
    let version = trimmed
        .strip_prefix('v')
        .unwrap_or(trimmed)
        .parse::<semver::Version>()
        .with_context(|| format!("invalid semver version '{version_str}'"))?;

    let tags: BTreeSet<String> = tags
        .or(meta.tags)
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut seen = BTreeSet::new();
    let depends_on: Vec<String> = depends_on
        .or(meta.depends_on)
        .unwrap_or_default()
        .into_iter()
        .map(|d| d.trim().to_owned())
        .filter(|d| !d.is_empty() && seen.insert(d.clone()))
        .collect();

    let conflicts_with: BTreeSet<String> = conflicts_with
        .or(meta.conflicts_with)
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty())
        .collect();

    let conflict_class = conflict_class
        .or(meta.conflict_class)
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty());

    let mut allowed_operations: BTreeSet<Operation> = allowed_operations
        .or(meta.allowed_operations)
        .unwrap_or_default()
        .into_iter()
        .collect();
    if let Some(tools) = allowed_tools {
        for tool in tools.names() {
            match Operation::from_tool_name(&tool) {
                Some(op) => {
                    allowed_operations.insert(op);
                }
                None => tracing::trace!(descriptor = %id, tool = %tool, "tool has no operation class"),
            }
        }
    }

    let descriptor = Descriptor {
        id,
        kind,
        name,
        description: description.trim().to_owned(),
        version,
        tags,
        depends_on,
        allowed_operations,
        estimated_cost: cost.or(meta.cost).unwrap_or(DEFAULT_COST),
        conflict_class,
        conflicts_with,
        source: source.map(Path::to_path_buf),
        body,
    };

    validate_descriptor(&descriptor)?;
    Ok(descriptor)
}

/// Validate a normalized descriptor.
///
/// Checks:
/// - `id` is a well-formed identifier
/// - `description` is non-empty
/// - `estimated_cost` is finite and non-negative
/// - no self-dependency and no self-conflict
pub fn validate_descriptor(descriptor: &Descriptor) -> anyhow::Result<()> {
    if !is_valid_id(&descriptor.id) {
        bail!(
            "descriptor id '{}' must contain only lowercase letters, digits, '-' and '_', \
             and must not start or end with a separator",
            descriptor.id
        );
    }

    if descriptor.description.is_empty() {
        bail!("descriptor '{}' has an empty description", descriptor.id);
    }

    if !descriptor.estimated_cost.is_finite() || descriptor.estimated_cost < 0.0 {
        bail!(
            "descriptor '{}' has invalid cost {}; cost must be a non-negative number",
            descriptor.id,
            descriptor.estimated_cost
        );
    }

    if descriptor.depends_on.iter().any(|d| d == &descriptor.id) {
        bail!("descriptor '{}' depends on itself", descriptor.id);
    }

    if descriptor.declares_conflict_with(&descriptor.id) {
        bail!(
            "descriptor '{}' lists itself in conflicts-with",
            descriptor.id
        );
    }

    Ok(())
}

/// Parse and normalize a descriptor file in one step.
pub fn load_descriptor(
    content: &str,
    kind: DescriptorKind,
    fallback_id: &str,
    source: Option<&Path>,
) -> anyhow::Result<Descriptor> {
    let (manifest, body) = parse_descriptor_md(content)?;
    normalize(manifest, body, kind, fallback_id, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_SKILL_MD: &str = r#"---
name: Git Commit Helper
description: Write conventional commit messages from staged changes
version: "1.2.0"
tags:
  - git
  - Commit
depends-on:
  - diff-reader
conflicts-with:
  - commit-wizard
conflict-class: git-commit
cost: 2.5
allowed-tools: Read, Grep, Bash(git diff:*)
metadata:
  author: capsmith
  version: "9.9.9"
---

# Git Commit Helper

Inspect the staged diff and propose a message.
"#;

    const MINIMAL_COMMAND_MD: &str = "---\ndescription: Run the test suite\n---\n\nRun tests.\n";

    #[test]
    fn test_parse_full_descriptor() {
        let descriptor = load_descriptor(
            FULL_SKILL_MD,
            DescriptorKind::Skill,
            "git-commit-helper",
            None,
        )
        .unwrap();

        assert_eq!(descriptor.id, "git-commit-helper");
        assert_eq!(descriptor.name, "Git Commit Helper");
        assert_eq!(descriptor.version, semver::Version::new(1, 2, 0));
        assert!(descriptor.tags.contains("git"));
        assert!(descriptor.tags.contains("commit"));
        assert_eq!(descriptor.depends_on, vec!["diff-reader"]);
        assert!(descriptor.declares_conflict_with("commit-wizard"));
        assert_eq!(descriptor.conflict_class.as_deref(), Some("git-commit"));
        assert!((descriptor.estimated_cost - 2.5).abs() < f64::EPSILON);
        assert!(descriptor.allowed_operations.contains(&Operation::ReadFile));
        assert!(descriptor.allowed_operations.contains(&Operation::ShellExec));
        assert!(descriptor.body.starts_with("# Git Commit Helper"));
    }

    #[test]
    fn test_parse_minimal_descriptor_applies_defaults() {
        let descriptor =
            load_descriptor(MINIMAL_COMMAND_MD, DescriptorKind::Command, "run-tests", None)
                .unwrap();

        assert_eq!(descriptor.id, "run-tests");
        assert_eq!(descriptor.name, "run-tests");
        assert_eq!(descriptor.version.to_string(), DEFAULT_VERSION);
        assert!((descriptor.estimated_cost - DEFAULT_COST).abs() < f64::EPSILON);
        assert!(descriptor.tags.is_empty());
        assert!(descriptor.allowed_operations.is_empty());
    }

    #[test]
    fn test_metadata_block_fills_missing_top_level_keys() {
        let content = "---\ndescription: Review pull requests\nmetadata:\n  version: \"2.0.0\"\n  categories: [review]\n  dependencies: [diff-reader]\n  cost: 3\n---\nbody\n";
        let descriptor =
            load_descriptor(content, DescriptorKind::Droid, "reviewer", None).unwrap();
        assert_eq!(descriptor.version, semver::Version::new(2, 0, 0));
        assert!(descriptor.tags.contains("review"));
        assert_eq!(descriptor.depends_on, vec!["diff-reader"]);
        assert!((descriptor.estimated_cost - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reject_missing_frontmatter() {
        let err = parse_descriptor_md("# Just markdown").unwrap_err();
        assert!(err.to_string().contains("must start with YAML frontmatter"));
    }

    #[test]
    fn test_reject_missing_closing_delimiter() {
        let err = parse_descriptor_md("---\ndescription: open\n").unwrap_err();
        assert!(err.to_string().contains("missing closing frontmatter"));
    }

    #[test]
    fn test_empty_frontmatter_is_not_an_unclosed_block() {
        let (yaml, body) = extract_frontmatter("---\n---\nbody").unwrap();
        assert_eq!(yaml, "");
        assert_eq!(body, "body");

        let err = load_descriptor("---\n---\nbody", DescriptorKind::Skill, "x", None).unwrap_err();
        assert!(err.to_string().contains("empty description"));
    }

    #[test]
    fn test_version_accepts_a_single_v_prefix() {
        let content = "---\ndescription: x\nversion: v1.2.0\n---\n";
        let descriptor = load_descriptor(content, DescriptorKind::Skill, "x", None).unwrap();
        assert_eq!(descriptor.version, semver::Version::new(1, 2, 0));

        let content = "---\ndescription: x\nversion: vvv1.0.0\n---\n";
        let err = load_descriptor(content, DescriptorKind::Skill, "x", None).unwrap_err();
        assert!(err.to_string().contains("invalid semver version"));
    }

    #[test]
    fn test_reject_invalid_semver() {
        let content = "---\ndescription: x\nversion: banana\n---\n";
        let err = load_descriptor(content, DescriptorKind::Skill, "x", None).unwrap_err();
        assert!(err.to_string().contains("invalid semver version"));
    }

    #[test]
    fn test_reject_negative_cost() {
        let content = "---\ndescription: x\ncost: -1\n---\n";
        let err = load_descriptor(content, DescriptorKind::Skill, "x", None).unwrap_err();
        assert!(err.to_string().contains("non-negative"));
    }

    #[test]
    fn test_reject_empty_description() {
        let content = "---\nname: nothing\n---\n";
        let err = load_descriptor(content, DescriptorKind::Skill, "nothing", None).unwrap_err();
        assert!(err.to_string().contains("empty description"));
    }

    #[test]
    fn test_reject_self_dependency() {
        let content = "---\ndescription: loops\ndepends-on: [loop]\n---\n";
        let err = load_descriptor(content, DescriptorKind::Skill, "loop", None).unwrap_err();
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn test_reject_invalid_explicit_id() {
        let content = "---\nid: My Skill\ndescription: spaces\n---\n";
        let err = load_descriptor(content, DescriptorKind::Skill, "fallback", None).unwrap_err();
        assert!(err.to_string().contains("lowercase letters"));
    }

    #[test]
    fn test_derive_id_normalizes_paths() {
        assert_eq!(derive_id(["git", "Commit Msg"]), "git-commit-msg");
        assert_eq!(derive_id(["review.pr"]), "review-pr");
        assert_eq!(derive_id(["", "--odd--"]), "odd");
    }
}
