//! Download-then-extract sequencing.
//!
//! [`Installer::download_and_install`] is meant to run on a single worker
//! thread. Readers follow it through the shared [`ProgressTracker`].

use crate::core::download::Transport;
use crate::core::extract::{ExtractSummary, SafeExtractor};
use crate::core::progress::{CancelToken, ProgressWriter, TransferError};
use crate::core::state::{InstallState, ProgressTracker};
use crate::error::Result;
use log::{info, warn};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const ARCHIVE_FILE_NAME: &str = "download.zip";

pub struct Installer<T> {
    transport: T,
    tracker: ProgressTracker,
    staged: bool,
    clamp_permissions: bool,
    cancel: CancelToken,
}

impl<T: Transport> Installer<T> {
    pub fn new(transport: T, tracker: ProgressTracker) -> Self {
        Self {
            transport,
            tracker,
            staged: false,
            clamp_permissions: true,
            cancel: CancelToken::new(),
        }
    }

    pub fn staged(mut self, staged: bool) -> Self {
        self.staged = staged;
        self
    }

    pub fn clamp_permissions(mut self, clamp: bool) -> Self {
        self.clamp_permissions = clamp;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Fetch `url` into a temporary archive and unpack it below `destination_root`.
    ///
    /// The first error ends the run and leaves the tracker in `Failed` with the
    /// error text. The temporary archive is removed on every path.
    pub fn download_and_install(&self, url: &str, destination_root: &Path) -> Result<ExtractSummary> {
        self.run_guarded(|| {
            let temp_dir = tempfile::Builder::new().prefix("zipinstall-").tempdir()?;
            let archive_path = temp_dir.path().join(ARCHIVE_FILE_NAME);

            {
                let mut file = File::create(&archive_path)?;
                self.download_to(url, &mut file)?;
            }

            self.extract_archive(&archive_path, destination_root)
        })
    }

    /// The download phase on its own: stream `url` into `sink`.
    ///
    /// The tracker's byte count follows the sink while bytes arrive. Once the
    /// transfer stops it is set to the writer's total, which on failure is the
    /// count reached before the failing chunk.
    pub fn download_to<W: Write>(&self, url: &str, sink: W) -> Result<u64> {
        info!("Downloading {url}");
        self.tracker.begin_download(url);

        let body = self.transport.get(url)?;
        let expected = body.expected_size();
        if expected == 0 {
            info!("Server did not announce a size for {url}");
        }

        let sink = TrackedSink {
            inner: sink,
            tracker: self.tracker.clone(),
            accepted: 0,
        };
        let tracker = self.tracker.clone();
        let mut writer = ProgressWriter::new(sink, expected, move |f| tracker.download_progress(f))
            .with_cancel(self.cancel.clone());

        let copied = writer.copy_from(body.reader);
        self.tracker.record_bytes(writer.bytes_written());
        let copied = copied?;

        writer.flush().map_err(|source| TransferError::Write {
            transferred: writer.bytes_written(),
            source,
        })?;

        info!("Downloaded {copied} bytes");
        Ok(copied)
    }

    /// The extraction phase on its own.
    pub fn extract_archive(&self, archive_path: &Path, destination_root: &Path) -> Result<ExtractSummary> {
        self.tracker.begin_extract();

        let extractor = SafeExtractor::new(destination_root)
            .clamp_permissions(self.clamp_permissions)
            .cancel_token(self.cancel.clone());
        let mut reporter = self.tracker.clone();

        if self.staged {
            extractor.extract_staged(archive_path, &mut reporter)
        } else {
            extractor.extract(archive_path, &mut reporter)
        }
    }

    fn run_guarded<F>(&self, work: F) -> Result<ExtractSummary>
    where
        F: FnOnce() -> Result<ExtractSummary>,
    {
        self.tracker.transition(InstallState::Running)?;

        match work() {
            Ok(summary) => {
                self.tracker.transition(InstallState::Succeeded)?;
                Ok(summary)
            }
            Err(e) => {
                warn!("Installation failed: {e}");
                self.tracker.transition(InstallState::Failed(e.to_string()))?;
                Err(e)
            }
        }
    }
}

/// Publishes the running byte count while the download is in flight.
struct TrackedSink<W> {
    inner: W,
    tracker: ProgressTracker,
    accepted: u64,
}

impl<W: Write> Write for TrackedSink<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.accepted += n as u64;
        self.tracker.record_bytes(self.accepted);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::download::RemoteBody;
    use crate::core::state::Phase;
    use crate::core::test_support::zip_bytes;
    use crate::error::InstallError;
    use pretty_assertions::assert_eq;
    use std::io::{self, Cursor, Read};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Serves a fixed payload, `chunk` bytes per read, optionally failing after `fail_at`.
    struct FakeTransport {
        payload: Vec<u8>,
        declared: Option<u64>,
        chunk: usize,
        fail_at: Option<usize>,
    }

    impl FakeTransport {
        fn serving(payload: Vec<u8>) -> Self {
            let declared = Some(payload.len() as u64);
            Self {
                payload,
                declared,
                chunk: 16,
                fail_at: None,
            }
        }
    }

    struct ChunkedReader {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        fail_at: Option<usize>,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let pos = self.data.position() as usize;
            if self.fail_at.is_some_and(|at| pos >= at) {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer went away"));
            }
            let n = self.chunk.min(buf.len());
            self.data.read(&mut buf[..n])
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, url: &str) -> Result<RemoteBody> {
            if url.starts_with("unreachable:") {
                return Err(InstallError::network_error(url, "connection refused"));
            }
            let reader = ChunkedReader {
                data: Cursor::new(self.payload.clone()),
                chunk: self.chunk,
                fail_at: self.fail_at,
            };
            Ok(RemoteBody::new(reader, self.declared))
        }
    }

    struct FailAfter {
        limit: usize,
        taken: usize,
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.taken >= self.limit {
                return Err(io::Error::other("no space left on device"));
            }
            let n = (self.limit - self.taken).min(buf.len());
            self.taken += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_download_and_install_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let payload = zip_bytes(&[("a/", None), ("a/b.txt", Some("hi")), ("c.txt", Some("bye"))]);
        let size = payload.len() as u64;
        let installer = Installer::new(FakeTransport::serving(payload), ProgressTracker::new());

        let dest = tmp.path().join("game");
        let summary = installer
            .download_and_install("http://example.invalid/client.zip", &dest)
            .unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(std::fs::read(dest.join("a/b.txt")).unwrap(), b"hi");
        assert_eq!(std::fs::read(dest.join("c.txt")).unwrap(), b"bye");

        let snap = installer.tracker().snapshot();
        assert_eq!(snap.state, InstallState::Succeeded);
        assert_eq!(snap.phase, Phase::Done);
        assert_eq!(snap.bytes, size);
        assert_eq!(snap.overall, 1.0);
    }

    #[test]
    fn test_sink_failure_preserves_byte_count() {
        let installer = Installer::new(FakeTransport::serving(vec![7u8; 100]), ProgressTracker::new());
        let sink = FailAfter { limit: 45, taken: 0 };

        let err = installer
            .download_to("http://example.invalid/a.zip", sink)
            .unwrap_err();

        assert!(matches!(
            err,
            InstallError::Transfer(TransferError::Write { transferred: 32, .. })
        ));
        assert_eq!(installer.tracker().snapshot().bytes, 32);
        assert_eq!(installer.tracker().snapshot().progress, 0.32);
    }

    #[test]
    fn test_sink_failure_fails_guarded_run() {
        let installer = Installer::new(FakeTransport::serving(vec![7u8; 100]), ProgressTracker::new());

        // same guard as download_and_install, with a sink that fills up
        let err = installer
            .run_guarded(|| {
                let sink = FailAfter { limit: 45, taken: 0 };
                installer.download_to("http://example.invalid/a.zip", sink)?;
                Ok(ExtractSummary::default())
            })
            .unwrap_err();

        assert!(matches!(
            err,
            InstallError::Transfer(TransferError::Write { transferred: 32, .. })
        ));
        let snap = installer.tracker().snapshot();
        assert_eq!(snap.state, InstallState::Failed(err.to_string()));
        assert_eq!(snap.status, err.to_string());
        assert_eq!(snap.bytes, 32);
    }

    /// Records the tracker's byte count each time the body is read.
    struct Observer {
        inner: ChunkedReader,
        tracker: ProgressTracker,
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl Read for Observer {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.seen.lock().unwrap().push(self.tracker.snapshot().bytes);
            self.inner.read(buf)
        }
    }

    struct ObservedTransport {
        tracker: ProgressTracker,
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl Transport for ObservedTransport {
        fn get(&self, _url: &str) -> Result<RemoteBody> {
            let inner = ChunkedReader {
                data: Cursor::new(vec![5u8; 48]),
                chunk: 16,
                fail_at: None,
            };
            let reader = Observer {
                inner,
                tracker: self.tracker.clone(),
                seen: Arc::clone(&self.seen),
            };
            Ok(RemoteBody::new(reader, Some(48)))
        }
    }

    #[test]
    fn test_byte_count_updates_during_download() {
        let tracker = ProgressTracker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let transport = ObservedTransport {
            tracker: tracker.clone(),
            seen: Arc::clone(&seen),
        };
        let installer = Installer::new(transport, tracker);

        installer
            .download_to("http://example.invalid/a.zip", Vec::new())
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 16, 32, 48]);
        assert_eq!(installer.tracker().snapshot().bytes, 48);
    }

    #[test]
    fn test_read_failure_marks_run_failed() {
        let tmp = TempDir::new().unwrap();
        let mut transport = FakeTransport::serving(vec![1u8; 64]);
        transport.fail_at = Some(32);
        let installer = Installer::new(transport, ProgressTracker::new());

        let dest = tmp.path().join("dest");
        let err = installer
            .download_and_install("http://example.invalid/a.zip", &dest)
            .unwrap_err();

        assert!(matches!(
            err,
            InstallError::Transfer(TransferError::Read { transferred: 32, .. })
        ));
        assert!(!dest.exists());
        let snap = installer.tracker().snapshot();
        assert!(matches!(snap.state, InstallState::Failed(_)));
        assert_eq!(snap.status, err.to_string());
    }

    #[test]
    fn test_failed_run_can_be_reset_and_retried() {
        let tmp = TempDir::new().unwrap();
        let payload = zip_bytes(&[("readme.txt", Some("hello"))]);
        let installer = Installer::new(FakeTransport::serving(payload), ProgressTracker::new());
        let dest = tmp.path().join("dest");

        let err = installer
            .download_and_install("unreachable://nowhere", &dest)
            .unwrap_err();
        assert!(matches!(err, InstallError::Network { .. }));

        // still failed: a second run needs an explicit reset
        assert!(matches!(
            installer.download_and_install("http://example.invalid/a.zip", &dest),
            Err(InstallError::InvalidTransition { .. })
        ));

        installer.tracker().reset().unwrap();
        installer
            .download_and_install("http://example.invalid/a.zip", &dest)
            .unwrap();
        assert_eq!(std::fs::read(dest.join("readme.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_hostile_archive_fails_install() {
        let tmp = TempDir::new().unwrap();
        let payload = zip_bytes(&[("../../etc/passwd", Some("root::0:0"))]);
        let installer = Installer::new(FakeTransport::serving(payload), ProgressTracker::new());

        let err = installer
            .download_and_install("http://example.invalid/a.zip", &tmp.path().join("dest"))
            .unwrap_err();

        assert!(matches!(err, InstallError::PathTraversal { .. }));
        assert!(!tmp.path().join("etc").exists());
        assert!(matches!(installer.tracker().state(), InstallState::Failed(_)));
    }

    #[test]
    fn test_unknown_length_still_downloads() {
        let mut transport = FakeTransport::serving(vec![3u8; 40]);
        transport.declared = None;
        let installer = Installer::new(transport, ProgressTracker::new());

        let mut sink = Vec::new();
        let copied = installer
            .download_to("http://example.invalid/a.zip", &mut sink)
            .unwrap();

        assert_eq!(copied, 40);
        assert_eq!(sink.len(), 40);
        assert_eq!(installer.tracker().snapshot().progress, 1.0);
    }

    #[test]
    fn test_cancelled_download() {
        let token = CancelToken::new();
        let installer = Installer::new(FakeTransport::serving(vec![0u8; 64]), ProgressTracker::new())
            .cancel_token(token.clone());
        token.cancel();

        let err = installer
            .download_to("http://example.invalid/a.zip", Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            InstallError::Transfer(TransferError::Cancelled { transferred: 0 })
        ));
    }
}
