//! Document identifiers
//!
//! Every PDF in the input directory gets a sequential integer identifier,
//! assigned once at batch start in directory-listing order. The resulting
//! [`IdentityMap`] is the only link between an original filename and the
//! dataset join key, and it is persisted next to the dataset so later
//! stages (annotation, merge) resolve documents the same way.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PdfStatError;

/// Join key of a document within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u32);

impl DocumentId {
    /// File name a document carries after an on-disk rename
    pub fn canonical_file_name(&self) -> String {
        format!("{}.pdf", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    pub id: DocumentId,
    pub original: String,
}

/// Immutable {original filename -> identifier} table for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMap {
    /// Whether the files were renamed to `<id>.pdf` on disk
    #[serde(default)]
    pub renamed: bool,
    entries: Vec<IdentityEntry>,
}

/// Whether a directory entry takes part in the batch
pub fn is_pdf_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
}

impl IdentityMap {
    /// Assign identifiers 0..K-1 in iteration order. Repeated names are
    /// ignored so a name never maps to two identifiers.
    pub fn assign<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<IdentityEntry> = Vec::new();
        for name in names {
            let original = name.into();
            if entries.iter().any(|e| e.original == original) {
                continue;
            }
            let id = DocumentId(entries.len() as u32);
            entries.push(IdentityEntry { id, original });
        }
        Self {
            renamed: false,
            entries,
        }
    }

    /// Snapshot the PDF files of a directory in listing order
    pub fn scan(dir: &Path) -> Result<Self, PdfStatError> {
        let read_dir = fs::read_dir(dir).map_err(|source| PdfStatError::Enumerate {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| PdfStatError::Enumerate {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !is_pdf_file(&path) {
                continue;
            }
            match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => names.push(name.to_string()),
                None => warn!("Skipping {}: file name is not valid UTF-8", path.display()),
            }
        }

        let map = Self::assign(names);
        info!(
            "Assigned identifiers to {} documents in {}",
            map.len(),
            dir.display()
        );
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IdentityEntry] {
        &self.entries
    }

    pub fn id_of(&self, original: &str) -> Option<DocumentId> {
        self.entries
            .iter()
            .find(|e| e.original == original)
            .map(|e| e.id)
    }

    pub fn original_of(&self, id: DocumentId) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.original.as_str())
    }

    /// Resolve a filename that is either an original name or `<id>.pdf`.
    ///
    /// Once the files are renamed, `<id>.pdf` is what sits on disk, so the
    /// canonical reading wins over an original that happens to look the
    /// same.
    pub fn resolve_file_name(&self, name: &str) -> Option<DocumentId> {
        if self.renamed {
            self.canonical_id(name).or_else(|| self.id_of(name))
        } else {
            self.id_of(name).or_else(|| self.canonical_id(name))
        }
    }

    fn canonical_id(&self, name: &str) -> Option<DocumentId> {
        let stem = name.strip_suffix(".pdf")?;
        let id = DocumentId(stem.parse().ok()?);
        self.original_of(id).map(|_| id)
    }

    /// Current on-disk location of a document
    pub fn path_of(&self, dir: &Path, id: DocumentId) -> Option<PathBuf> {
        let original = self.original_of(id)?;
        if self.renamed {
            Some(dir.join(id.canonical_file_name()))
        } else {
            Some(dir.join(original))
        }
    }

    /// Rename every file to `<id>.pdf`.
    ///
    /// Goes through temporary names first so an input already called e.g.
    /// `0.pdf` is never overwritten by another document's rename. If any
    /// step fails, the renames done so far are undone and the map stays
    /// unrenamed.
    pub fn rename_on_disk(&mut self, dir: &Path) -> Result<(), PdfStatError> {
        if self.renamed {
            return Ok(());
        }

        let moves: Vec<(PathBuf, PathBuf, PathBuf)> = self
            .entries
            .iter()
            .map(|e| {
                (
                    dir.join(&e.original),
                    dir.join(format!(".pdfstat-rename-{}.tmp", e.id)),
                    dir.join(e.id.canonical_file_name()),
                )
            })
            .collect();

        for (done, (original, tmp, _)) in moves.iter().enumerate() {
            if let Err(e) = fs::rename(original, tmp) {
                warn!("Cannot rename '{}': {}", original.display(), e);
                undo_renames(moves[..done].iter().map(|(o, t, _)| (t, o)));
                return Err(e.into());
            }
        }
        for (done, (original, tmp, target)) in moves.iter().enumerate() {
            if let Err(e) = fs::rename(tmp, target) {
                warn!("Cannot rename to '{}': {}", target.display(), e);
                undo_renames(moves[..done].iter().map(|(_, t, c)| (c, t)));
                undo_renames(moves.iter().map(|(o, t, _)| (t, o)));
                return Err(e.into());
            }
            debug!("Renamed '{}' to '{}'", original.display(), target.display());
        }

        self.renamed = true;
        info!("Renamed {} documents in {}", self.len(), dir.display());
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), PdfStatError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PdfStatError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Best-effort `from -> to` renames; failures are logged and skipped
fn undo_renames<'a>(pairs: impl Iterator<Item = (&'a PathBuf, &'a PathBuf)>) {
    for (from, to) in pairs {
        if let Err(e) = fs::rename(from, to) {
            warn!(
                "Cannot restore '{}' from '{}': {}",
                to.display(),
                from.display(),
                e
            );
        }
    }
}
