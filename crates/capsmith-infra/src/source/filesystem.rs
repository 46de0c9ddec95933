//! Directory-tree content source.
//!
//! Layout under the content root:
//! ```text
//! {root}/skills/{id}/SKILL.md        -> Skill
//! {root}/droids/{id}.md              -> Droid
//! {root}/commands/{a}/{b}/{id}.md    -> Command, id "a-b-id"
//! ```
//! Missing kind directories are fine; a missing root is an error. Hidden
//! files and directories are skipped.

use std::path::{Path, PathBuf};

use capsmith_core::manifest::derive_id;
use capsmith_core::registry::{ContentSource, RawDocument};
use capsmith_types::descriptor::DescriptorKind;
use capsmith_types::error::SourceError;

const SKILL_FILE: &str = "SKILL.md";

/// Reads descriptor documents from a content root on disk.
#[derive(Debug, Clone)]
pub struct FsContentSource {
    root: PathBuf,
}

impl FsContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_skills(&self, out: &mut Vec<RawDocument>) -> Result<(), SourceError> {
        let dir = self.root.join("skills");
        for entry in list_dir(&dir).await? {
            if !entry.is_dir {
                continue;
            }
            let path = entry.path.join(SKILL_FILE);
            if !is_file(&path).await {
                tracing::debug!(dir = %entry.path.display(), "skill directory without SKILL.md");
                continue;
            }
            out.push(RawDocument {
                kind: DescriptorKind::Skill,
                fallback_id: derive_id([entry.name.as_str()]),
                content: read(&path).await?,
                path,
            });
        }
        Ok(())
    }

    async fn read_droids(&self, out: &mut Vec<RawDocument>) -> Result<(), SourceError> {
        let dir = self.root.join("droids");
        for entry in list_dir(&dir).await? {
            let Some(stem) = markdown_stem(&entry) else {
                continue;
            };
            out.push(RawDocument {
                kind: DescriptorKind::Droid,
                fallback_id: derive_id([stem]),
                content: read(&entry.path).await?,
                path: entry.path,
            });
        }
        Ok(())
    }

    /// Walk `commands/` iteratively; nested directories contribute their
    /// names to the id.
    async fn read_commands(&self, out: &mut Vec<RawDocument>) -> Result<(), SourceError> {
        let mut pending: Vec<(PathBuf, Vec<String>)> = vec![(self.root.join("commands"), Vec::new())];

        while let Some((dir, prefix)) = pending.pop() {
            for entry in list_dir(&dir).await? {
                if entry.is_dir {
                    let mut nested = prefix.clone();
                    nested.push(entry.name.clone());
                    pending.push((entry.path, nested));
                    continue;
                }
                let Some(stem) = markdown_stem(&entry) else {
                    continue;
                };
                let segments = prefix.iter().map(String::as_str).chain([stem]);
                out.push(RawDocument {
                    kind: DescriptorKind::Command,
                    fallback_id: derive_id(segments),
                    content: read(&entry.path).await?,
                    path: entry.path,
                });
            }
        }
        Ok(())
    }
}

impl ContentSource for FsContentSource {
    async fn fetch(&self) -> Result<Vec<RawDocument>, SourceError> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            return Err(SourceError::MissingRoot(self.root.display().to_string()));
        }

        let mut documents = Vec::new();
        self.read_skills(&mut documents).await?;
        self.read_droids(&mut documents).await?;
        self.read_commands(&mut documents).await?;

        // Directory iteration order is platform-dependent.
        documents.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::debug!(
            root = %self.root.display(),
            documents = documents.len(),
            "scanned content root"
        );
        Ok(documents)
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

struct DirEntry {
    path: PathBuf,
    name: String,
    is_dir: bool,
}

/// Non-hidden entries of `dir`; an absent directory yields nothing.
async fn list_dir(dir: &Path) -> Result<Vec<DirEntry>, SourceError> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir, &e)),
    };

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(|e| io_error(dir, &e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| io_error(&entry.path(), &e))?;
        entries.push(DirEntry {
            path: entry.path(),
            name,
            is_dir: file_type.is_dir(),
        });
    }
    Ok(entries)
}

fn markdown_stem(entry: &DirEntry) -> Option<&str> {
    if entry.is_dir {
        return None;
    }
    entry.name.strip_suffix(".md")
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn read(path: &Path) -> Result<String, SourceError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, &e))
}

fn io_error(path: &Path, err: &std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsmith_core::registry::Registry;
    use tempfile::TempDir;

    async fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, content).await.unwrap();
    }

    async fn sample_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(
            root,
            "skills/git-commit/SKILL.md",
            "---\nname: git-commit\ndescription: Write commit messages\ntags: [git]\n---\nUse conventional commits.",
        )
        .await;
        write(root, "skills/empty-dir/README.md", "not a skill").await;
        write(
            root,
            "droids/reviewer.md",
            "---\nname: reviewer\ndescription: Review pull requests\ntools: Read, Grep\n---\n",
        )
        .await;
        write(
            root,
            "commands/frontend/lint.md",
            "---\ndescription: Lint the frontend\n---\n",
        )
        .await;
        write(root, "commands/deploy.md", "---\ndescription: Deploy\n---\n").await;
        write(root, "commands/.hidden.md", "---\ndescription: Hidden\n---\n").await;
        write(root, "commands/notes.txt", "ignored").await;
        tmp
    }

    #[tokio::test]
    async fn test_fetch_walks_every_kind() {
        let tmp = sample_tree().await;
        let docs = FsContentSource::new(tmp.path()).fetch().await.unwrap();

        let mut ids: Vec<(DescriptorKind, &str)> = docs
            .iter()
            .map(|d| (d.kind, d.fallback_id.as_str()))
            .collect();
        ids.sort();
        assert_eq!(
            ids,
            vec![
                (DescriptorKind::Skill, "git-commit"),
                (DescriptorKind::Droid, "reviewer"),
                (DescriptorKind::Command, "deploy"),
                (DescriptorKind::Command, "frontend-lint"),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetched_documents_build_a_registry() {
        let tmp = sample_tree().await;
        let docs = FsContentSource::new(tmp.path()).fetch().await.unwrap();
        let registry = Registry::from_documents(docs).unwrap();

        assert_eq!(registry.len(), 4);
        let lint = registry.lookup("frontend-lint").unwrap();
        assert_eq!(lint.kind, DescriptorKind::Command);
        assert!(lint.source.as_ref().unwrap().ends_with("commands/frontend/lint.md"));
        assert_eq!(
            registry.lookup("git-commit").unwrap().body,
            "Use conventional commits."
        );
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = FsContentSource::new(tmp.path().join("nope"))
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::MissingRoot(_)));
    }

    #[tokio::test]
    async fn test_empty_root_yields_no_documents() {
        let tmp = TempDir::new().unwrap();
        let docs = FsContentSource::new(tmp.path()).fetch().await.unwrap();
        assert!(docs.is_empty());
    }
}
