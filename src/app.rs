use std::borrow::Cow;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::archive::ArchiveCandidates;
use crate::config::{ArchiveConfig, DataLocations, DataTypeConfig, Location, StoreConfig};
use crate::domain::{DataStore, FileFormat, FileSet, Member, TransferMode};
use crate::error::RetrieveError;
use crate::manifest::{Combinations, ContextBuilder, Manifest};
use crate::summary;
use crate::template::Template;
use crate::transfer::Transfer;

/// Fully resolved input of one retrieval run.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub cycle: DateTime<Utc>,
    /// Stores in priority order.
    pub data_stores: Vec<DataStore>,
    pub data_type: String,
    pub file_set: FileSet,
    pub file_format: Option<FileFormat>,
    pub lead_times: Vec<TimeDelta>,
    pub members: Vec<Member>,
    /// Overrides the configured file names, for the disk store only.
    pub file_templates: Vec<Template>,
    pub input_path: Option<Template>,
    pub output_path: Utf8PathBuf,
    pub summary_file: Option<Utf8PathBuf>,
    pub mode: TransferMode,
}

impl RetrievalRequest {
    pub fn validate(&self) -> Result<(), RetrieveError> {
        if self.data_stores.is_empty() {
            return Err(RetrieveError::NoDataStores);
        }
        if self.data_stores.contains(&DataStore::Disk) && self.input_path.is_none() {
            return Err(RetrieveError::MissingInputPath);
        }
        Ok(())
    }

    fn selection(&self) -> String {
        match self.file_format {
            Some(format) => format!("{} {} {format}", self.data_type, self.file_set),
            None => format!("{} {}", self.data_type, self.file_set),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalOutcome {
    pub success: bool,
    pub store: Option<DataStore>,
    pub manifest: Option<Manifest>,
    pub attempts: Vec<Attempt>,
}

/// One manifest handed to the transfer primitive.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub store: DataStore,
    pub index: usize,
    pub ready: usize,
    pub not_ready: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Everything needed to enumerate the candidate manifests of one store.
struct StorePlan<'a> {
    store: DataStore,
    templates: &'a [Template],
    locations: Cow<'a, [Location]>,
    archive: Option<(&'a ArchiveConfig, &'a [Template])>,
    context: ContextBuilder<'a>,
}

impl StorePlan<'_> {
    fn candidates<'p>(
        &'p self,
        lead_times: &'p [TimeDelta],
        members: &'p [Member],
    ) -> Candidates<'p> {
        match self.archive {
            Some((archive, names)) => Candidates::Archive(ArchiveCandidates::new(
                &self.locations,
                &archive.internal_dirs,
                names,
                archive.format,
                self.templates,
                lead_times,
                members,
                self.context.clone(),
            )),
            None => Candidates::Plain(Combinations::new(
                &self.locations,
                self.templates,
                lead_times,
                members,
                self.context.clone(),
            )),
        }
    }
}

enum Candidates<'a> {
    Plain(Combinations<'a>),
    Archive(ArchiveCandidates<'a>),
}

impl Iterator for Candidates<'_> {
    type Item = Result<Manifest, RetrieveError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Candidates::Plain(inner) => inner.next(),
            Candidates::Archive(inner) => inner.next(),
        }
    }
}

/// Tries each requested store in order until one manifest transfers
/// completely.
pub struct App<T: Transfer> {
    locations: DataLocations,
    transfer: T,
}

impl<T: Transfer> App<T> {
    pub fn new(locations: DataLocations, transfer: T) -> Self {
        Self {
            locations,
            transfer,
        }
    }

    /// Runs the tiered retrieval. Exhausting every store is reported as an
    /// unsuccessful outcome, not an error. Setup and template errors abort.
    pub fn retrieve(
        &self,
        request: &RetrievalRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalOutcome, RetrieveError> {
        request.validate()?;
        let started = Instant::now();
        let data_type = self.locations.data_type(&request.data_type)?;
        let plans = request
            .data_stores
            .iter()
            .map(|store| plan_store(data_type, *store, request))
            .collect::<Result<Vec<_>, _>>()?;

        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} across {} store(s)",
                request.selection(),
                plans.len()
            ),
            elapsed: None,
        });

        let mut attempts = Vec::new();
        for plan in &plans {
            tracing::info!(store = %plan.store, "trying data store");
            for (index, manifest) in plan
                .candidates(&request.lead_times, &request.members)
                .enumerate()
            {
                let manifest = manifest?;
                tracing::debug!(
                    store = %plan.store,
                    index,
                    files = manifest.len(),
                    "transferring manifest"
                );
                sink.event(ProgressEvent {
                    message: format!(
                        "phase=Transfer; {} candidate {} ({} files)",
                        plan.store,
                        index + 1,
                        manifest.len()
                    ),
                    elapsed: Some(started.elapsed()),
                });

                let attempt = match self.transfer.transfer(
                    &manifest,
                    request.output_path.as_std_path(),
                    request.mode,
                ) {
                    Ok(report) => {
                        let complete = report.is_complete(&manifest);
                        let attempt = Attempt {
                            store: plan.store,
                            index,
                            ready: report.ready.len(),
                            not_ready: report.not_ready,
                        };
                        if complete {
                            attempts.push(attempt);
                            return self.finish(
                                request, plan.store, manifest, attempts, started, sink,
                            );
                        }
                        attempt
                    }
                    Err(err) => {
                        tracing::warn!(store = %plan.store, index, error = %err, "transfer failed");
                        Attempt {
                            store: plan.store,
                            index,
                            ready: 0,
                            not_ready: manifest.targets().map(str::to_string).collect(),
                        }
                    }
                };
                tracing::debug!(
                    store = %plan.store,
                    index,
                    missing = attempt.not_ready.len(),
                    "manifest incomplete"
                );
                attempts.push(attempt);
            }
            tracing::info!(store = %plan.store, "data store has no complete candidate");
        }

        tracing::error!(
            selection = %request.selection(),
            stores = ?request.data_stores,
            "could not retrieve the requested files from any data store"
        );
        sink.event(ProgressEvent {
            message: "phase=Done; all data stores exhausted".to_string(),
            elapsed: Some(started.elapsed()),
        });
        Ok(RetrievalOutcome {
            success: false,
            store: None,
            manifest: None,
            attempts,
        })
    }

    fn finish(
        &self,
        request: &RetrievalRequest,
        store: DataStore,
        manifest: Manifest,
        attempts: Vec<Attempt>,
        started: Instant,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalOutcome, RetrieveError> {
        tracing::info!(
            %store,
            files = manifest.len(),
            output = %request.output_path,
            "retrieved files"
        );
        if let Some(path) = &request.summary_file {
            summary::write_summary(path.as_std_path(), &manifest)?;
            tracing::info!(summary = %path, "wrote summary");
        }
        sink.event(ProgressEvent {
            message: format!("phase=Done; retrieved {} files from {store}", manifest.len()),
            elapsed: Some(started.elapsed()),
        });
        Ok(RetrievalOutcome {
            success: true,
            store: Some(store),
            manifest: Some(manifest),
            attempts,
        })
    }
}

fn plan_store<'a>(
    data_type: &'a DataTypeConfig,
    store: DataStore,
    request: &'a RetrievalRequest,
) -> Result<StorePlan<'a>, RetrieveError> {
    let config: Option<&StoreConfig> = match store {
        DataStore::Disk => data_type.store(store).ok(),
        _ => Some(data_type.store(store)?),
    };

    let templates = if store == DataStore::Disk && !request.file_templates.is_empty() {
        request.file_templates.as_slice()
    } else {
        match config.and_then(|config| config.file_names(request.file_set, request.file_format)) {
            Some(names) => names,
            None => data_type.file_names(request.file_set, request.file_format)?,
        }
    };

    let locations = match (store, &request.input_path) {
        (DataStore::Disk, Some(input_path)) => {
            Cow::Owned(vec![Location::Single(input_path.clone())])
        }
        (DataStore::Disk, None) => return Err(RetrieveError::MissingInputPath),
        _ => Cow::Borrowed(config.map(|config| config.locations.as_slice()).unwrap_or_default()),
    };

    let archive = match config.and_then(|config| config.archive.as_ref()) {
        Some(archive) => {
            let names = archive
                .file_names(request.file_set, request.file_format)
                .ok_or_else(|| RetrieveError::MissingFileNames {
                    data_type: data_type.name().to_string(),
                    context: format!("{store} archive names for {}", request.file_set),
                })?;
            Some((archive, names))
        }
        None => None,
    };

    let mut context = ContextBuilder::new(request.cycle).with_defaults(data_type.defaults());
    if let Some(config) = config {
        context = context.with_defaults(&config.defaults);
    }

    Ok(StorePlan {
        store,
        templates,
        locations,
        archive,
        context,
    })
}
