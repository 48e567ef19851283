//! Role package assembly and loading.
//!
//! A role package is a zip archive named `<role>.zip` holding exactly three
//! members:
//!
//! | Member | File | Content |
//! |---|---|---|
//! | index | `embed_index.idx` | binary [`VectorIndex`] |
//! | corpus | `dataset.json` | JSON list of `{question, answer}` |
//! | prompt | `system_prompt.txt` | UTF-8 system prompt |
//!
//! Builds stage the serialized members in a per-call temporary directory and
//! write the archive under a temporary name in the destination directory; the
//! archive is renamed into place only after it is complete. Both temporaries
//! are removed when the call returns, whether it succeeded or not.

use std::fmt;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};
use zip::ZipArchive;
use zip::result::ZipError;
use zip::write::FileOptions;

use crate::builder::VectorIndexBuilder;
use crate::config::BuildConfig;
use crate::corpus::CorpusStore;
use crate::embedding::EmbeddingProvider;
use crate::error::{RolePackError, Result};
use crate::index::{ExemplarStore, VectorIndex};

/// Extension of role package archives.
pub const PACKAGE_EXTENSION: &str = "zip";

/// Largest uncompressed size accepted for a single package member (1 GiB).
pub const MAX_MEMBER_BYTES: u64 = 1 << 30;

/// One of the three fixed members of a role package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageMember {
    /// The serialized vector index.
    Index,
    /// The serialized question/answer corpus.
    Corpus,
    /// The role's system prompt.
    Prompt,
}

impl PackageMember {
    /// All members, in archive order.
    pub const ALL: [PackageMember; 3] =
        [PackageMember::Index, PackageMember::Corpus, PackageMember::Prompt];

    /// Logical name used in errors and logs.
    pub fn logical_name(self) -> &'static str {
        match self {
            PackageMember::Index => "index",
            PackageMember::Corpus => "corpus",
            PackageMember::Prompt => "prompt",
        }
    }

    /// File name of the member inside the archive. Case-sensitive.
    pub fn file_name(self) -> &'static str {
        match self {
            PackageMember::Index => "embed_index.idx",
            PackageMember::Corpus => "dataset.json",
            PackageMember::Prompt => "system_prompt.txt",
        }
    }
}

impl fmt::Display for PackageMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_name())
    }
}

/// Where a finished package was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageHandle {
    /// The role the package belongs to.
    pub role_name: String,
    /// Path of the archive.
    pub path: PathBuf,
    /// Number of corpus records (and index vectors).
    pub records: usize,
    /// Width of the index vectors.
    pub dimensions: usize,
}

/// A loaded role package: its role name, exemplars, and system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct RolePackage {
    role_name: String,
    store: ExemplarStore,
    prompt: String,
}

impl RolePackage {
    /// The role name, taken from the archive's file stem.
    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    /// The paired corpus and index.
    pub fn store(&self) -> &ExemplarStore {
        &self.store
    }

    /// The corpus half.
    pub fn corpus(&self) -> &CorpusStore {
        self.store.corpus()
    }

    /// The index half.
    pub fn index(&self) -> &VectorIndex {
        self.store.index()
    }

    /// The role's system prompt.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Split into the corpus, the index, and the prompt text.
    pub fn into_parts(self) -> (CorpusStore, VectorIndex, String) {
        let (corpus, index) = self.store.into_parts();
        (corpus, index, self.prompt)
    }
}

/// Produces role package archives from a corpus source and a prompt file.
///
/// # Example
///
/// ```rust,ignore
/// use rolepack::RolePackageBuilder;
///
/// let builder = RolePackageBuilder::new(embedder, "output");
/// let handle = builder.build("dataset.json", "system_prompt.txt", "爱莉").await?;
/// println!("wrote {}", handle.path.display());
/// ```
pub struct RolePackageBuilder {
    index_builder: VectorIndexBuilder,
    output_dir: PathBuf,
}

impl RolePackageBuilder {
    /// Create a builder that writes packages into `output_dir`.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index_builder: VectorIndexBuilder::new(embedding_provider),
            output_dir: output_dir.into(),
        }
    }

    /// Replace the index build configuration.
    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.index_builder = self.index_builder.with_config(config);
        self
    }

    /// Directory packages are written to.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Path the package for `role_name` is written to.
    pub fn package_path(&self, role_name: &str) -> PathBuf {
        self.output_dir.join(format!("{role_name}.{PACKAGE_EXTENSION}"))
    }

    /// Read the sources, embed the corpus, and write `<output_dir>/<role_name>.zip`.
    ///
    /// An existing package for the role is replaced only once the new one is
    /// complete.
    ///
    /// # Errors
    ///
    /// - [`RolePackError::ConfigError`] for an unusable role name.
    /// - [`RolePackError::SourceReadError`] if the corpus or prompt cannot be read.
    /// - [`RolePackError::EmbeddingError`] / [`RolePackError::DimensionMismatch`]
    ///   from the index build.
    /// - [`RolePackError::PackagingError`] if staging or archive assembly fails.
    ///
    /// On error nothing is left at the package path that was not there before.
    pub async fn build(
        &self,
        corpus_source: impl AsRef<Path>,
        prompt_source: impl AsRef<Path>,
        role_name: &str,
    ) -> Result<PackageHandle> {
        validate_role_name(role_name)?;
        let corpus_source = corpus_source.as_ref();
        let prompt_source = prompt_source.as_ref();

        let prompt = fs::read_to_string(prompt_source)
            .map_err(|e| RolePackError::source_read(prompt_source, e))?;
        let corpus = CorpusStore::from_path(corpus_source)?;

        let store = self.index_builder.build(corpus).await?;
        let records = store.len();
        let dimensions = store.dimensions();

        let output_dir = self.output_dir.clone();
        let destination = self.package_path(role_name);
        let target = destination.clone();
        tokio::task::spawn_blocking(move || write_package(&output_dir, &target, &store, &prompt))
            .await
            .map_err(|e| RolePackError::PackagingError(format!("packaging task failed: {e}")))?
            .map_err(|e| {
                error!(role = role_name, error = %e, "failed to assemble role package");
                e
            })?;

        info!(
            role = role_name,
            path = %destination.display(),
            records,
            dimensions,
            "built role package"
        );
        Ok(PackageHandle {
            role_name: role_name.to_string(),
            path: destination,
            records,
            dimensions,
        })
    }
}

fn validate_role_name(role_name: &str) -> Result<()> {
    let invalid = role_name.trim().is_empty()
        || role_name == "."
        || role_name == ".."
        || role_name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(RolePackError::ConfigError(format!("invalid role name '{role_name}'")));
    }
    Ok(())
}

fn packaging_error(context: &str, err: impl fmt::Display) -> RolePackError {
    RolePackError::PackagingError(format!("{context}: {err}"))
}

/// Stage the index and corpus members, then assemble and publish the archive.
fn write_package(
    output_dir: &Path,
    destination: &Path,
    store: &ExemplarStore,
    prompt: &str,
) -> Result<()> {
    fs::create_dir_all(output_dir)
        .map_err(|e| packaging_error("failed to create output directory", e))?;

    // Removed on drop, on every path out of this function.
    let staging = tempfile::Builder::new()
        .prefix(".rolepack-staging-")
        .tempdir_in(output_dir)
        .map_err(|e| packaging_error("failed to create staging directory", e))?;

    let index_path = staging.path().join(PackageMember::Index.file_name());
    let corpus_path = staging.path().join(PackageMember::Corpus.file_name());
    fs::write(&index_path, store.index().to_bytes()?)
        .map_err(|e| packaging_error("failed to stage index", e))?;
    let corpus_json = store
        .corpus()
        .to_json_pretty()
        .map_err(|e| packaging_error("failed to encode corpus", e))?;
    fs::write(&corpus_path, corpus_json)
        .map_err(|e| packaging_error("failed to stage corpus", e))?;

    let mut partial = tempfile::Builder::new()
        .prefix(".rolepack-")
        .suffix(".zip.partial")
        .tempfile_in(output_dir)
        .map_err(|e| packaging_error("failed to create archive", e))?;

    {
        let mut zip = zip::ZipWriter::new(partial.as_file_mut());
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for member in PackageMember::ALL {
            zip.start_file(member.file_name(), options)
                .map_err(|e| packaging_error("failed to add archive member", e))?;
            let bytes = match member {
                PackageMember::Index => fs::read(&index_path)
                    .map_err(|e| packaging_error("failed to read staged index", e))?,
                PackageMember::Corpus => fs::read(&corpus_path)
                    .map_err(|e| packaging_error("failed to read staged corpus", e))?,
                PackageMember::Prompt => prompt.as_bytes().to_vec(),
            };
            zip.write_all(&bytes)
                .map_err(|e| packaging_error("failed to write archive member", e))?;
        }
        zip.finish().map_err(|e| packaging_error("failed to finish archive", e))?;
    }

    partial.as_file().sync_all().map_err(|e| packaging_error("failed to sync archive", e))?;
    partial
        .persist(destination)
        .map_err(|e| packaging_error("failed to move archive into place", e.error))?;
    Ok(())
}

/// Reads role package archives.
///
/// Every load checks that the corpus and index hold the same number of
/// entries before handing anything back.
///
/// # Example
///
/// ```rust,ignore
/// use rolepack::RolePackageLoader;
///
/// let package = RolePackageLoader::load("output/爱莉.zip")?;
/// println!("{} exemplars for {}", package.corpus().len(), package.role_name());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePackageLoader;

impl RolePackageLoader {
    /// Load a package from an archive file.
    ///
    /// # Errors
    ///
    /// - [`RolePackError::SourceReadError`] if the file cannot be opened.
    /// - [`RolePackError::MalformedArchive`] if the container or a member
    ///   cannot be parsed.
    /// - [`RolePackError::MissingMember`] naming the first absent member.
    /// - [`RolePackError::CorpusIndexSizeMismatch`] if the halves disagree.
    pub fn load(archive_path: impl AsRef<Path>) -> Result<RolePackage> {
        let archive_path = archive_path.as_ref();
        let file =
            fs::File::open(archive_path).map_err(|e| RolePackError::source_read(archive_path, e))?;
        let role_name = archive_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let package = read_package(file, role_name)?;
        info!(
            role = package.role_name(),
            path = %archive_path.display(),
            records = package.corpus().len(),
            dimensions = package.index().dimensions(),
            "loaded role package"
        );
        Ok(package)
    }

    /// Load a package from archive bytes already in memory.
    pub fn load_from_bytes(bytes: &[u8], role_name: impl Into<String>) -> Result<RolePackage> {
        read_package(Cursor::new(bytes), role_name.into())
    }

    /// Validate a package and extract its three members into `dest_dir`.
    ///
    /// Returns the member paths in [`PackageMember::ALL`] order
    /// (index, corpus, prompt). Members are staged next to `dest_dir` and
    /// moved in only once all three are written; if a move fails, members
    /// already moved by this call are removed again.
    pub fn extract(
        archive_path: impl AsRef<Path>,
        dest_dir: impl AsRef<Path>,
    ) -> Result<[PathBuf; 3]> {
        let archive_path = archive_path.as_ref();
        let dest_dir = dest_dir.as_ref();
        let bytes =
            fs::read(archive_path).map_err(|e| RolePackError::source_read(archive_path, e))?;
        Self::load_from_bytes(&bytes, String::new())?;

        let mut archive = open_archive(Cursor::new(bytes.as_slice()))?;
        fs::create_dir_all(dest_dir)
            .map_err(|e| packaging_error("failed to create extraction directory", e))?;
        let staging = tempfile::Builder::new()
            .prefix(".rolepack-extract-")
            .tempdir_in(dest_dir)
            .map_err(|e| packaging_error("failed to create staging directory", e))?;

        for member in PackageMember::ALL {
            let content = read_member(&mut archive, member, MAX_MEMBER_BYTES)?;
            fs::write(staging.path().join(member.file_name()), content)
                .map_err(|e| packaging_error("failed to stage member", e))?;
        }

        let paths = PackageMember::ALL.map(|member| dest_dir.join(member.file_name()));
        for (moved, (member, target)) in PackageMember::ALL.iter().zip(&paths).enumerate() {
            if let Err(e) = fs::rename(staging.path().join(member.file_name()), target) {
                for placed in &paths[..moved] {
                    let _ = fs::remove_file(placed);
                }
                error!(path = %target.display(), error = %e, "failed to extract package member");
                return Err(packaging_error("failed to extract member", e));
            }
        }
        Ok(paths)
    }
}

fn open_archive<R: Read + Seek>(reader: R) -> Result<ZipArchive<R>> {
    ZipArchive::new(reader).map_err(|e| RolePackError::MalformedArchive(e.to_string()))
}

fn read_member<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    member: PackageMember,
    limit: u64,
) -> Result<Vec<u8>> {
    let mut entry = archive.by_name(member.file_name()).map_err(|e| match e {
        ZipError::FileNotFound => RolePackError::MissingMember { member },
        other => RolePackError::MalformedArchive(format!("member '{member}': {other}")),
    })?;
    if entry.size() > limit {
        return Err(RolePackError::MalformedArchive(format!(
            "member '{member}' declares {} bytes, limit is {limit}",
            entry.size()
        )));
    }
    // The declared size is only a claim; bound what is actually inflated too.
    let mut content = Vec::new();
    entry
        .by_ref()
        .take(limit.saturating_add(1))
        .read_to_end(&mut content)
        .map_err(|e| RolePackError::MalformedArchive(format!("member '{member}': {e}")))?;
    if content.len() as u64 > limit {
        return Err(RolePackError::MalformedArchive(format!(
            "member '{member}' exceeds {limit} bytes"
        )));
    }
    Ok(content)
}

fn read_package<R: Read + Seek>(reader: R, role_name: String) -> Result<RolePackage> {
    let mut archive = open_archive(reader)?;

    // Check presence up front so a missing member is reported before any parse error.
    for member in PackageMember::ALL {
        if !archive.file_names().any(|name| name == member.file_name()) {
            return Err(RolePackError::MissingMember { member });
        }
    }

    let index_bytes = read_member(&mut archive, PackageMember::Index, MAX_MEMBER_BYTES)?;
    let index = VectorIndex::from_bytes(&index_bytes)?;
    let corpus_bytes = read_member(&mut archive, PackageMember::Corpus, MAX_MEMBER_BYTES)?;
    let corpus: CorpusStore = serde_json::from_slice(&corpus_bytes)
        .map_err(|e| RolePackError::MalformedArchive(format!("member 'corpus': {e}")))?;
    let prompt_bytes = read_member(&mut archive, PackageMember::Prompt, MAX_MEMBER_BYTES)?;
    let prompt = String::from_utf8(prompt_bytes)
        .map_err(|e| RolePackError::MalformedArchive(format!("member 'prompt': {e}")))?;

    let store = ExemplarStore::from_parts(corpus, index)?;
    Ok(RolePackage { role_name, store, prompt })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_names_are_fixed() {
        assert_eq!(PackageMember::Index.file_name(), "embed_index.idx");
        assert_eq!(PackageMember::Corpus.file_name(), "dataset.json");
        assert_eq!(PackageMember::Prompt.file_name(), "system_prompt.txt");
        assert_eq!(PackageMember::Corpus.to_string(), "corpus");
    }

    #[test]
    fn role_names_cannot_escape_output_dir() {
        assert!(validate_role_name("爱莉").is_ok());
        assert!(validate_role_name("example role").is_ok());
        for bad in ["", "  ", "..", "a/b", "a\\b"] {
            assert!(
                matches!(validate_role_name(bad), Err(RolePackError::ConfigError(_))),
                "accepted {bad:?}"
            );
        }
    }

    fn stored_zip(name: &str, content: &[u8]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file(name, options).unwrap();
        zip.write_all(content).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn member_over_declared_limit_is_malformed() {
        let bytes = stored_zip("system_prompt.txt", &[b'x'; 64]);
        let mut archive = open_archive(Cursor::new(bytes)).unwrap();
        let err = read_member(&mut archive, PackageMember::Prompt, 16).unwrap_err();
        assert!(err.to_string().contains("declares 64 bytes"));
    }

    #[test]
    fn member_larger_than_it_declares_is_cut_off() {
        let mut bytes = stored_zip("system_prompt.txt", &[b'x'; 64]);
        // Understate the uncompressed size in the central directory record.
        let central = bytes.windows(4).position(|w| w == [0x50, 0x4b, 0x01, 0x02]).unwrap();
        bytes[central + 24..central + 28].copy_from_slice(&4u32.to_le_bytes());

        let mut archive = open_archive(Cursor::new(bytes)).unwrap();
        let err = read_member(&mut archive, PackageMember::Prompt, 16).unwrap_err();
        assert!(matches!(err, RolePackError::MalformedArchive(_)));
        assert!(err.to_string().contains("exceeds 16 bytes"));

        let content = read_member(&mut archive, PackageMember::Prompt, 64).unwrap();
        assert_eq!(content.len(), 64);
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let err = RolePackageLoader::load_from_bytes(b"definitely not a zip", "x").unwrap_err();
        assert!(matches!(err, RolePackError::MalformedArchive(_)));
    }
}
