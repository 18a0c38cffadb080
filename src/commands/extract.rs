use crate::core::config::Config;
use crate::core::extract::{ArchiveEntry, ExtractReporter, SafeExtractor};
use crate::error::Result;
use crate::utils::fs;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Shows one tick per archive entry.
struct EntryBar {
    bar: ProgressBar,
    current: u64,
}

impl ExtractReporter for EntryBar {
    fn entry_started(&mut self, entry: &ArchiveEntry, index: usize, total: usize) {
        self.current = index as u64;
        self.bar.set_length(total as u64);
        self.bar.set_position(self.current);
        self.bar.set_message(entry.name.clone());
    }

    fn entry_progress(&mut self, fraction: f64) {
        if fraction >= 1.0 {
            self.bar.set_position(self.current + 1);
        }
    }
}

pub fn extract_local(archive: &Path, destination: &Path, staged: bool, keep_modes: bool) -> Result<()> {
    let config = Config::load()?;

    println!("Extracting {} into {}", archive.display(), destination.display());

    let staged = staged || config.staged_extraction;
    if staged && destination.exists() && !fs::is_empty_dir(destination) {
        println!("⚠️  Destination will be replaced; files not in the archive will be removed.");
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    let mut reporter = EntryBar { bar, current: 0 };

    let extractor = SafeExtractor::new(destination)
        .clamp_permissions(config.clamp_permissions && !keep_modes);
    let result = if staged {
        extractor.extract_staged(archive, &mut reporter)
    } else {
        extractor.extract(archive, &mut reporter)
    };

    match result {
        Ok(summary) => {
            reporter.bar.finish_with_message("done");
            println!(
                "✅ Extracted {} files and {} directories ({} bytes)",
                summary.files, summary.directories, summary.bytes
            );
            Ok(())
        }
        Err(e) => {
            reporter.bar.abandon_with_message("failed");
            Err(e)
        }
    }
}
