use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;

use crate::archive::ArchiveAddress;
use crate::config::ArchiveFormat;
use crate::domain::TransferMode;
use crate::error::RetrieveError;
use crate::fs_util;
use crate::hpss::{ArchiveClient, HtarClient};
use crate::http::{HttpClient, HttpFetch};
use crate::manifest::Manifest;

/// Per-target readiness after one transfer attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub ready: Vec<String>,
    pub not_ready: Vec<String>,
}

impl TransferReport {
    /// True only when every target of `manifest` is ready and nothing is
    /// reported not ready.
    pub fn is_complete(&self, manifest: &Manifest) -> bool {
        !self.ready.is_empty()
            && self.not_ready.is_empty()
            && manifest
                .targets()
                .all(|target| self.ready.iter().any(|ready| ready == target))
    }
}

/// Copies or links every entry of a manifest into `target_dir`.
pub trait Transfer: Send + Sync {
    fn transfer(
        &self,
        manifest: &Manifest,
        target_dir: &Path,
        mode: TransferMode,
    ) -> Result<TransferReport, RetrieveError>;
}

impl<T: Transfer + ?Sized> Transfer for &T {
    fn transfer(
        &self,
        manifest: &Manifest,
        target_dir: &Path,
        mode: TransferMode,
    ) -> Result<TransferReport, RetrieveError> {
        (**self).transfer(manifest, target_dir, mode)
    }
}

enum Source<'a> {
    Local(&'a Path),
    Url(&'a str),
    Archived(ArchiveAddress),
}

impl<'a> Source<'a> {
    fn classify(address: &'a str) -> Self {
        if let Some(archived) = ArchiveAddress::parse(address) {
            Source::Archived(archived)
        } else if address.starts_with("http://") || address.starts_with("https://") {
            Source::Url(address)
        } else {
            Source::Local(Path::new(address.strip_prefix("file://").unwrap_or(address)))
        }
    }
}

/// Transfer over the local filesystem, HTTP and archives. Entries are staged
/// in a scratch directory inside the target directory and only moved into
/// place when every entry of the manifest is ready, so a failed attempt
/// leaves the target directory as it was.
#[derive(Clone)]
pub struct FsTransfer<H: HttpFetch, A: ArchiveClient> {
    http: H,
    archive: A,
}

impl FsTransfer<HttpClient, HtarClient> {
    pub fn system() -> Result<Self, RetrieveError> {
        Ok(Self::new(HttpClient::new()?, HtarClient::new()))
    }
}

impl<H: HttpFetch, A: ArchiveClient> FsTransfer<H, A> {
    pub fn new(http: H, archive: A) -> Self {
        Self { http, archive }
    }

    fn stage_local(
        &self,
        source: &Path,
        staged: &Path,
        mode: TransferMode,
    ) -> Result<bool, RetrieveError> {
        if !source.is_file() {
            return Ok(false);
        }
        fs_util::ensure_parent(staged)?;
        match mode {
            TransferMode::Copy => {
                fs::copy(source, staged)
                    .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
            }
            TransferMode::Symlink => {
                let original = fs::canonicalize(source)
                    .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
                fs_util::symlink_file(&original, staged)
                    .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
            }
        }
        Ok(true)
    }

    fn stage_htar(
        &self,
        staging: &Path,
        archive: &str,
        entries: &[(&str, PathBuf, String)],
    ) -> Result<Vec<(String, bool)>, RetrieveError> {
        let scratch = scratch_dir(staging)?;
        let members = entries
            .iter()
            .map(|(_, _, member)| member.clone())
            .collect::<Vec<_>>();
        if let Err(err) = self.archive.extract(archive, &members, scratch.path()) {
            tracing::warn!(%archive, error = %err, "htar extraction incomplete");
        }

        entries
            .iter()
            .map(|(target, staged, member)| {
                let extracted = scratch.path().join(member.trim_start_matches('/'));
                let ready = extracted.is_file();
                if ready {
                    fs_util::replace_file(&extracted, staged)?;
                }
                Ok((target.to_string(), ready))
            })
            .collect()
    }

    fn stage_zip(
        &self,
        staging: &Path,
        archive: &str,
        entries: &[(&str, PathBuf, String)],
    ) -> Result<Vec<(String, bool)>, RetrieveError> {
        let scratch = scratch_dir(staging)?;
        let zip_path = if archive.starts_with("http://") || archive.starts_with("https://") {
            let downloaded = scratch.path().join("archive.zip");
            if !self.http.fetch(archive, &downloaded)? {
                return Ok(missing(entries));
            }
            downloaded
        } else {
            let local = PathBuf::from(archive.strip_prefix("file://").unwrap_or(archive));
            if !local.is_file() {
                return Ok(missing(entries));
            }
            local
        };

        entries
            .iter()
            .map(|(target, staged, member)| {
                let ready = fs_util::extract_zip_member(&zip_path, member, staged)?;
                Ok((target.to_string(), ready))
            })
            .collect()
    }
}

impl<H: HttpFetch, A: ArchiveClient> Transfer for FsTransfer<H, A> {
    fn transfer(
        &self,
        manifest: &Manifest,
        target_dir: &Path,
        mode: TransferMode,
    ) -> Result<TransferReport, RetrieveError> {
        fs::create_dir_all(target_dir)
            .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;
        let staging = tempfile::Builder::new()
            .prefix(".retrieve-staging")
            .tempdir_in(target_dir)
            .map_err(|err| RetrieveError::Filesystem(err.to_string()))?;

        let mut report = TransferReport::default();
        let mut in_place = BTreeSet::new();
        let mut archives: BTreeMap<(ArchiveFormat, String), Vec<(&str, PathBuf, String)>> =
            BTreeMap::new();

        for (target, source) in manifest {
            let Some(relative) = fs_util::enclosed_path(target) else {
                tracing::warn!(%target, "target escapes the output directory");
                report.not_ready.push(target.clone());
                continue;
            };
            let staged = staging.path().join(&relative);
            let outcome = match Source::classify(source) {
                Source::Archived(address) => {
                    archives
                        .entry((address.format, address.archive))
                        .or_default()
                        .push((target.as_str(), staged, address.member));
                    continue;
                }
                Source::Url(url) => {
                    if mode == TransferMode::Symlink {
                        tracing::debug!(%url, "remote source, downloading instead of linking");
                    }
                    self.http.fetch(url, &staged)
                }
                Source::Local(path) if already_in_place(path, &target_dir.join(&relative), mode) => {
                    tracing::debug!(%target, "source is the target, leaving it in place");
                    in_place.insert(target.as_str());
                    Ok(true)
                }
                Source::Local(path) => self.stage_local(path, &staged, mode),
            };
            record(&mut report, target, source, outcome);
        }

        for ((format, archive), entries) in &archives {
            let outcomes = match format {
                ArchiveFormat::Htar => self.stage_htar(staging.path(), archive, entries),
                ArchiveFormat::Zip => self.stage_zip(staging.path(), archive, entries),
            };
            match outcomes {
                Ok(outcomes) => {
                    for (target, ready) in outcomes {
                        record(&mut report, &target, archive, Ok(ready));
                    }
                }
                Err(err) => {
                    tracing::warn!(%archive, error = %err, "archive transfer failed");
                    report
                        .not_ready
                        .extend(entries.iter().map(|(target, _, _)| target.to_string()));
                }
            }
        }

        report.ready.sort();
        report.not_ready.sort();

        if report.is_complete(manifest) {
            let staged = report
                .ready
                .iter()
                .filter(|target| !in_place.contains(target.as_str()))
                .collect::<Vec<_>>();
            commit(staging, target_dir, &staged)?;
        }
        Ok(report)
    }
}

fn record(
    report: &mut TransferReport,
    target: &str,
    source: &str,
    outcome: Result<bool, RetrieveError>,
) {
    match outcome {
        Ok(true) => report.ready.push(target.to_string()),
        Ok(false) => {
            tracing::debug!(%target, %source, "not found");
            report.not_ready.push(target.to_string());
        }
        Err(err) => {
            tracing::warn!(%target, %source, error = %err, "transfer failed");
            report.not_ready.push(target.to_string());
        }
    }
}

fn missing(entries: &[(&str, PathBuf, String)]) -> Vec<(String, bool)> {
    entries
        .iter()
        .map(|(target, _, _)| (target.to_string(), false))
        .collect()
}

fn scratch_dir(staging: &Path) -> Result<TempDir, RetrieveError> {
    tempfile::Builder::new()
        .prefix(".extract")
        .tempdir_in(staging)
        .map_err(|err| RetrieveError::Filesystem(err.to_string()))
}

/// True when a local source already is the file at `destination`. Staging
/// and committing it would replace the only copy of the data.
fn already_in_place(source: &Path, destination: &Path, mode: TransferMode) -> bool {
    if !source.is_file() {
        return false;
    }
    let (Ok(source), Ok(resolved)) = (fs::canonicalize(source), fs::canonicalize(destination))
    else {
        return false;
    };
    if source != resolved {
        return false;
    }
    // A copy must not keep a link in place of a file.
    mode == TransferMode::Symlink
        || fs::symlink_metadata(destination).is_ok_and(|meta| !meta.file_type().is_symlink())
}

/// Moves staged targets into `target_dir`. When a move fails, targets this
/// commit created are removed again; targets that replaced an existing file
/// cannot be restored and are logged.
fn commit(staging: TempDir, target_dir: &Path, targets: &[&String]) -> Result<(), RetrieveError> {
    let mut created: Vec<PathBuf> = Vec::new();
    let mut replaced = Vec::new();
    for target in targets {
        let destination = target_dir.join(target);
        let existed = fs::symlink_metadata(&destination).is_ok();
        if let Err(err) = fs_util::replace_file(&staging.path().join(target), &destination) {
            for path in &created {
                if let Err(remove_err) = fs::remove_file(path) {
                    tracing::error!(
                        path = %path.display(),
                        error = %remove_err,
                        "could not roll back target"
                    );
                }
            }
            if !replaced.is_empty() {
                tracing::error!(
                    targets = ?replaced,
                    "commit failed after replacing existing targets"
                );
            }
            return Err(err);
        }
        if existed {
            replaced.push(target.as_str());
        } else {
            created.push(destination);
        }
    }
    staging
        .close()
        .map_err(|err| RetrieveError::Filesystem(err.to_string()))
}
