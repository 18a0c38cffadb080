use crate::core::progress::{CancelToken, ProgressWriter, TransferError};
use crate::error::{InstallError, Result};
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Component, Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

/// Modes are masked with this unless clamping is turned off.
const CLAMP_MASK: u32 = 0o755;

/// One entry of the archive index. Read once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name as stored in the archive. Untrusted.
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub mode: Option<u32>,
}

/// Receives per-entry progress while an archive is unpacked.
pub trait ExtractReporter {
    fn entry_started(&mut self, entry: &ArchiveEntry, index: usize, total: usize);
    fn entry_progress(&mut self, fraction: f64);
}

pub struct NoopReporter;

impl ExtractReporter for NoopReporter {
    fn entry_started(&mut self, _entry: &ArchiveEntry, _index: usize, _total: usize) {}
    fn entry_progress(&mut self, _fraction: f64) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// Unpacks a zip archive below a destination root, refusing any entry whose
/// name would land outside it.
///
/// Entries are processed in archive order and the first failure aborts the
/// whole run. Entries already written stay on disk; use
/// [`SafeExtractor::extract_staged`] when the destination must only change on
/// full success.
#[derive(Debug, Clone)]
pub struct SafeExtractor {
    root: PathBuf,
    clamp_permissions: bool,
    cancel: Option<CancelToken>,
}

impl SafeExtractor {
    pub fn new<P: Into<PathBuf>>(destination_root: P) -> Self {
        Self {
            root: destination_root.into(),
            clamp_permissions: true,
            cancel: None,
        }
    }

    pub fn clamp_permissions(mut self, clamp: bool) -> Self {
        self.clamp_permissions = clamp;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn extract<R>(&self, archive_path: &Path, reporter: &mut R) -> Result<ExtractSummary>
    where
        R: ExtractReporter + ?Sized,
    {
        info!("Extracting {archive_path:?} to {:?}", self.root);

        let file = File::open(archive_path).map_err(|e| InstallError::ArchiveOpen {
            path: archive_path.to_path_buf(),
            source: ZipError::Io(e),
        })?;
        let mut archive =
            ZipArchive::new(BufReader::new(file)).map_err(|source| InstallError::ArchiveOpen {
                path: archive_path.to_path_buf(),
                source,
            })?;

        let summary = self.extract_from(&mut archive, reporter)?;
        info!(
            "Extracted {} files and {} directories ({} bytes)",
            summary.files, summary.directories, summary.bytes
        );
        Ok(summary)
    }

    /// Extract into a sibling staging directory, then swap it into place.
    ///
    /// The destination is only touched after every entry was written. An
    /// existing destination is replaced as a whole: files that are not in the
    /// archive do not survive.
    pub fn extract_staged<R>(&self, archive_path: &Path, reporter: &mut R) -> Result<ExtractSummary>
    where
        R: ExtractReporter + ?Sized,
    {
        let root = absolute_root(&self.root)?;
        let parent = root.parent().ok_or_else(|| InstallError::Destination {
            path: root.clone(),
            source: std::io::Error::other("destination has no parent directory"),
        })?;
        fs::create_dir_all(parent).map_err(|source| InstallError::Destination {
            path: parent.to_path_buf(),
            source,
        })?;

        let staging = tempfile::Builder::new()
            .prefix(".zipinstall-staging-")
            .tempdir_in(parent)
            .map_err(|source| InstallError::Destination {
                path: parent.to_path_buf(),
                source,
            })?;
        debug!("Staging extraction in {:?}", staging.path());

        let staged = SafeExtractor {
            root: staging.path().to_path_buf(),
            ..self.clone()
        };
        let summary = staged.extract(archive_path, reporter)?;

        swap_into_place(staging.path(), &root)?;
        Ok(summary)
    }

    fn extract_from<A, R>(&self, archive: &mut ZipArchive<A>, reporter: &mut R) -> Result<ExtractSummary>
    where
        A: Read + Seek,
        R: ExtractReporter + ?Sized,
    {
        let root = absolute_root(&self.root)?;
        fs::create_dir_all(&root).map_err(|source| InstallError::Destination {
            path: root.clone(),
            source,
        })?;

        let total = archive.len();
        let mut summary = ExtractSummary::default();

        for index in 0..total {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(TransferError::Cancelled {
                    transferred: summary.bytes,
                }
                .into());
            }

            let mut file = archive
                .by_index(index)
                .map_err(|source| InstallError::ArchiveRead { index, source })?;
            let entry = ArchiveEntry {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                size: file.size(),
                mode: file.unix_mode(),
            };
            let target = resolve_entry_path(&root, &entry.name)?;

            reporter.entry_started(&entry, index, total);

            if entry.is_dir {
                debug!("Creating directory {}", entry.name);
                fs::create_dir_all(&target)
                    .map_err(|e| InstallError::entry_write(&entry.name, e))?;
                self.apply_mode(&target, &entry, true)?;
                summary.directories += 1;
                continue;
            }

            debug!("Decompressing {} ({} bytes)", entry.name, entry.size);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| InstallError::entry_write(&entry.name, e))?;
            }

            let mut out =
                File::create(&target).map_err(|e| InstallError::entry_write(&entry.name, e))?;
            let copied = {
                let mut writer =
                    ProgressWriter::new(&mut out, entry.size, |f| reporter.entry_progress(f));
                if let Some(token) = &self.cancel {
                    writer = writer.with_cancel(token.clone());
                }
                writer.copy_from(&mut file)
            }
            .map_err(|source| InstallError::ExtractionWrite {
                entry: entry.name.clone(),
                source,
            })?;
            drop(out);

            self.apply_mode(&target, &entry, false)?;
            summary.files += 1;
            summary.bytes += copied;
        }

        Ok(summary)
    }

    #[cfg(unix)]
    fn apply_mode(&self, target: &Path, entry: &ArchiveEntry, is_dir: bool) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let Some(stored) = entry.mode else {
            return Ok(());
        };
        let mut mode = stored & 0o7777;
        if self.clamp_permissions {
            mode &= CLAMP_MASK;
        }
        if is_dir {
            // later entries still have to be written inside it
            mode |= 0o700;
        }
        fs::set_permissions(target, fs::Permissions::from_mode(mode))
            .map_err(|e| InstallError::entry_write(&entry.name, e))
    }

    #[cfg(not(unix))]
    fn apply_mode(&self, _target: &Path, _entry: &ArchiveEntry, _is_dir: bool) -> Result<()> {
        Ok(())
    }
}

/// Move the fully extracted `staged` tree to `root`.
///
/// An existing `root` is first renamed to a sibling backup and only deleted
/// once the new tree is in place. If the second rename fails the backup is
/// moved back, so `root` is either the old tree or the new one.
fn swap_into_place(staged: &Path, root: &Path) -> Result<()> {
    let destination_error = |source: std::io::Error| InstallError::Destination {
        path: root.to_path_buf(),
        source,
    };

    let backup = if root.exists() {
        let mut name = staged.file_name().unwrap_or_default().to_os_string();
        name.push(".previous");
        let backup = staged.with_file_name(name);
        debug!("Moving {root:?} aside to {backup:?}");
        fs::rename(root, &backup).map_err(destination_error)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(staged, root) {
        if let Some(backup) = &backup {
            if let Err(restore) = fs::rename(backup, root) {
                warn!("Cannot restore {root:?} from {backup:?}: {restore}");
            }
        }
        return Err(destination_error(e));
    }

    if let Some(backup) = backup {
        let removed = if backup.is_dir() {
            fs::remove_dir_all(&backup)
        } else {
            fs::remove_file(&backup)
        };
        if let Err(e) = removed {
            warn!("Cannot remove previous installation at {backup:?}: {e}");
        }
    }
    Ok(())
}

/// Join an untrusted entry name onto `root`, refusing anything that would
/// resolve outside of it.
///
/// `root` must already be absolute and lexically clean. Both `/` and `\` are
/// treated as separators. The root itself is not a valid target.
pub fn resolve_entry_path(root: &Path, name: &str) -> Result<PathBuf> {
    let reject = || InstallError::PathTraversal {
        entry: name.to_string(),
    };

    if name.contains('\0') || name.starts_with('/') || name.starts_with('\\') {
        return Err(reject());
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop().ok_or_else(reject)?;
            }
            s if segments.is_empty() && is_drive_prefix(s) => return Err(reject()),
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(reject());
    }

    let target = segments
        .iter()
        .fold(root.to_path_buf(), |path, segment| path.join(segment));

    if target == root || !target.starts_with(root) {
        return Err(reject());
    }
    Ok(target)
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Make `path` absolute and drop `.` and `..` components without touching the filesystem.
pub fn absolute_root(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| InstallError::Destination {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}
