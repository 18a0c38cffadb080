use crate::error::{InstallError, Result};
use std::path::Path;

pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => InstallError::Destination {
                path: path.to_path_buf(),
                source: e,
            },
            _ => InstallError::from(e),
        })?;
    }
    Ok(())
}

/// Count files and directories below `path`, not including `path` itself.
pub fn count_tree(path: &Path) -> Result<(usize, usize)> {
    let mut files = 0;
    let mut directories = 0;

    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();

        if entry_path.is_dir() {
            directories += 1;
            let (f, d) = count_tree(&entry_path)?;
            files += f;
            directories += d;
        } else {
            files += 1;
        }
    }

    Ok((files, directories))
}

pub fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
