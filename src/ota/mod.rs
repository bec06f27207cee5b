//! OTA Manager (design spec §4.D) — download, verify, and apply a firmware
//! archive while `app_tick` is suspended, with safe abort and state
//! restoration.

pub mod archive;
pub mod http;

pub use archive::{Archive, ArchiveFile};

use crate::error::Result;
use async_trait::async_trait;
use log::warn;

/// OTA Manager state. `Aborting` is transient — `apply` always leaves the
/// manager back in `Idle` on any failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Downloading,
    Verifying,
    Applying,
    Reboot,
}

/// HTTP download is modelled behind this port so the manager has no direct
/// dependency on a particular client crate; [`http::HttpOtaFetch`] is the
/// `reqwest`-backed production implementation.
#[async_trait]
pub trait OtaFetchPort: Send + Sync {
    /// Resolve "latest" (a requested version of `0`) to a concrete version.
    async fn fetch_version(&self, app: &str) -> Result<u32>;

    /// Download the archive bytes for `app` at `version`.
    async fn fetch_build(&self, app: &str, version: u32) -> Result<Vec<u8>>;
}

/// Writing files to durable storage — an external collaborator (flashing,
/// filesystem) the OTA manager never touches directly.
#[async_trait]
pub trait FirmwareWriterPort: Send + Sync {
    async fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()>;
}

/// Drives the download/verify/apply algorithm. Does not itself talk to the
/// bus or mutate [`crate::runtime::DeviceRuntime`] status — the embedding
/// `on_ota` capability is expected to call [`DeviceRuntime::enter_maintenance`]
/// first and [`DeviceRuntime::resume_running`] / [`DeviceRuntime::request_reset`]
/// based on this manager's result.
///
/// [`DeviceRuntime::enter_maintenance`]: crate::runtime::DeviceRuntime::enter_maintenance
/// [`DeviceRuntime::resume_running`]: crate::runtime::DeviceRuntime::resume_running
/// [`DeviceRuntime::request_reset`]: crate::runtime::DeviceRuntime::request_reset
pub struct OtaManager<F> {
    fetch: F,
    app: String,
    state: OtaState,
}

impl<F: OtaFetchPort> OtaManager<F> {
    pub fn new(fetch: F, app: impl Into<String>) -> Self {
        Self {
            fetch,
            app: app.into(),
            state: OtaState::Idle,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Run download, verify, and apply for `requested_version` (`0` means
    /// "latest", resolved via [`OtaFetchPort::fetch_version`]).
    ///
    /// Returns `Ok(true)` on success — the caller should hard-reset.
    /// Returns `Ok(false)` on a clean abort (version mismatch, fetch
    /// failure, malformed archive, or write failure) — the caller should
    /// restore the pre-OTA status snapshot and resume `RUNNING`. Only an
    /// unexpected error from [`OtaFetchPort::fetch_version`] itself
    /// propagates as `Err`.
    pub async fn apply(
        &mut self,
        requested_version: u32,
        writer: &mut dyn FirmwareWriterPort,
    ) -> Result<bool> {
        self.state = OtaState::Downloading;

        let target_version = if requested_version == 0 {
            self.fetch.fetch_version(&self.app).await?
        } else {
            requested_version
        };

        let bytes = match self.fetch.fetch_build(&self.app, target_version).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("OTA update aborting: fetch failed: {e}");
                self.state = OtaState::Idle;
                return Ok(false);
            }
        };

        self.state = OtaState::Verifying;
        let archive = match Archive::parse(&bytes, target_version) {
            Ok(archive) => archive,
            Err(e) => {
                warn!("OTA update aborting: {e}");
                self.state = OtaState::Idle;
                return Ok(false);
            }
        };

        self.state = OtaState::Applying;
        for file in &archive.files {
            if let Err(e) = writer.write_file(&file.name, &file.data).await {
                warn!("OTA update aborting: write failed for {}: {e}", file.name);
                self.state = OtaState::Idle;
                return Ok(false);
            }
        }

        self.state = OtaState::Reboot;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubFetch {
        resolved_version: u32,
        archive: Vec<u8>,
    }

    #[async_trait]
    impl OtaFetchPort for StubFetch {
        async fn fetch_version(&self, _app: &str) -> Result<u32> {
            Ok(self.resolved_version)
        }

        async fn fetch_build(&self, _app: &str, _version: u32) -> Result<Vec<u8>> {
            Ok(self.archive.clone())
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl FirmwareWriterPort for RecordingWriter {
        async fn write_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
            self.written
                .lock()
                .unwrap()
                .push((name.to_string(), data.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn applies_a_matching_archive() {
        let archive = Archive {
            version: 42,
            files: vec![ArchiveFile {
                name: "firmware.bin".to_string(),
                data: vec![1, 2, 3],
            }],
        };
        let mut manager = OtaManager::new(
            StubFetch {
                resolved_version: 42,
                archive: archive.encode(),
            },
            "device",
        );
        let mut writer = RecordingWriter::default();

        let applied = manager.apply(42, &mut writer).await.unwrap();
        assert!(applied);
        assert_eq!(manager.state(), OtaState::Reboot);
        assert_eq!(writer.written.lock().unwrap().len(), 1);
    }

    /// Scenario S4: requested version 42, but the archive returned by the
    /// fetch port reports version 41 — a stale/mismatched build. The
    /// manager must abort cleanly rather than write files.
    #[tokio::test]
    async fn aborts_on_version_mismatch() {
        let stale_archive = Archive {
            version: 41,
            files: vec![],
        };
        let mut manager = OtaManager::new(
            StubFetch {
                resolved_version: 42,
                archive: stale_archive.encode(),
            },
            "device",
        );
        let mut writer = RecordingWriter::default();

        let applied = manager.apply(42, &mut writer).await.unwrap();
        assert!(!applied);
        assert_eq!(manager.state(), OtaState::Idle);
        assert!(writer.written.lock().unwrap().is_empty());
    }
}
