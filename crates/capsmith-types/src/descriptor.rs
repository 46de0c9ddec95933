//! Capability descriptor domain types.
//!
//! Defines the on-disk manifest shape (YAML frontmatter of a skill, droid or
//! command file) and the normalized, immutable [`Descriptor`] the registry
//! builds from it.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

/// The kind of capability a descriptor represents.
///
/// - `Skill`: a reusable instruction bundle (`skills/<id>/SKILL.md`).
/// - `Droid`: a delegated sub-agent definition (`droids/<id>.md`).
/// - `Command`: a user-invocable slash command (`commands/<id>.md`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Skill,
    Droid,
    Command,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skill => write!(f, "skill"),
            Self::Droid => write!(f, "droid"),
            Self::Command => write!(f, "command"),
        }
    }
}

impl FromStr for DescriptorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skill" | "skills" => Ok(Self::Skill),
            "droid" | "droids" => Ok(Self::Droid),
            "command" | "commands" => Ok(Self::Command),
            other => Err(format!(
                "unknown descriptor kind '{other}' (expected skill, droid or command)"
            )),
        }
    }
}

/// Side-effecting operation class a descriptor may invoke.
///
/// Operations are declared by the content and checked against the engine's
/// operation policy; they never influence matching.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ReadFile,
    WriteFile,
    Network,
    ShellExec,
    ReadEnv,
    SpawnAgent,
}

impl Operation {
    /// Map an agent-runtime tool name (as found in `allowed-tools` or `tools`
    /// frontmatter) onto the operation class it exercises.
    ///
    /// Returns `None` for tools with no side effect worth policing.
    pub fn from_tool_name(tool: &str) -> Option<Self> {
        // Tool specs may carry an argument pattern, e.g. `Bash(git add:*)`.
        let base = tool.split('(').next().unwrap_or(tool).trim();
        match base.to_ascii_lowercase().as_str() {
            "bash" | "shell" | "execute" => Some(Self::ShellExec),
            "read" | "grep" | "glob" | "ls" | "notebookread" => Some(Self::ReadFile),
            "write" | "edit" | "multiedit" | "create" | "notebookedit" => Some(Self::WriteFile),
            "webfetch" | "websearch" | "fetchurl" => Some(Self::Network),
            "task" => Some(Self::SpawnAgent),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile => write!(f, "read_file"),
            Self::WriteFile => write!(f, "write_file"),
            Self::Network => write!(f, "network"),
            Self::ShellExec => write!(f, "shell_exec"),
            Self::ReadEnv => write!(f, "read_env"),
            Self::SpawnAgent => write!(f, "spawn_agent"),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest types (frontmatter as written on disk)
// ---------------------------------------------------------------------------

/// Tool list as it appears in frontmatter: either a comma-separated string
/// (`allowed-tools: Read, Grep, Bash`) or a YAML sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ToolList {
    Inline(String),
    List(Vec<String>),
}

impl ToolList {
    /// Individual tool names, trimmed, empty entries removed.
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Inline(s) => s
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .collect(),
            Self::List(items) => items
                .iter()
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

/// Parsed YAML frontmatter of a descriptor file.
///
/// Only `description` is required. Extension keys may sit at the top level or
/// under `metadata` (the open skill manifest convention); top-level values win.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorManifest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, alias = "categories")]
    pub tags: Option<Vec<String>>,
    #[serde(default, rename = "depends-on", alias = "dependencies")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, rename = "conflicts-with")]
    pub conflicts_with: Option<Vec<String>>,
    #[serde(default, rename = "conflict-class")]
    pub conflict_class: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default, rename = "allowed-operations")]
    pub allowed_operations: Option<Vec<Operation>>,
    #[serde(default, rename = "allowed-tools", alias = "tools")]
    pub allowed_tools: Option<ToolList>,
    #[serde(default)]
    pub metadata: Option<ManifestMetadata>,
}

/// Extension keys nested under `metadata` in the frontmatter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, alias = "categories")]
    pub tags: Option<Vec<String>>,
    #[serde(default, rename = "depends-on", alias = "dependencies")]
    pub depends_on: Option<Vec<String>>,
    #[serde(default, rename = "conflicts-with")]
    pub conflicts_with: Option<Vec<String>>,
    #[serde(default, rename = "conflict-class")]
    pub conflict_class: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default, rename = "allowed-operations")]
    pub allowed_operations: Option<Vec<Operation>>,
}

// ---------------------------------------------------------------------------
// Normalized descriptor
// ---------------------------------------------------------------------------

/// A normalized, immutable capability descriptor.
///
/// Built once by the registry loader and shared behind `Arc` for the life of
/// a registry snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Descriptor {
    pub id: String,
    pub kind: DescriptorKind,
    pub name: String,
    /// Matching corpus.
    pub description: String,
    pub version: semver::Version,
    pub tags: BTreeSet<String>,
    /// Prerequisites, in declaration order.
    pub depends_on: Vec<String>,
    pub allowed_operations: BTreeSet<Operation>,
    /// Relative resource weight, never negative.
    pub estimated_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_class: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub conflicts_with: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Opaque instruction payload below the frontmatter.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

impl Descriptor {
    /// Whether this descriptor lists `other` in its `conflicts-with` set.
    pub fn declares_conflict_with(&self, other: &str) -> bool {
        self.conflicts_with.contains(other)
    }
}
