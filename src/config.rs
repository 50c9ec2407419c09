use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;

use crate::domain::{DataStore, FileFormat, FileSet};
use crate::error::RetrieveError;
use crate::template::Template;

/// Raw data locations file: data type label to its entry.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct Config {
    pub data_types: BTreeMap<String, DataTypeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataTypeEntry {
    pub file_names: FileNames,
    #[serde(default)]
    pub defaults: BTreeMap<String, Template>,
    #[serde(default)]
    pub disk: Option<StoreEntry>,
    #[serde(default)]
    pub aws: Option<StoreEntry>,
    #[serde(default)]
    pub nomads: Option<StoreEntry>,
    #[serde(default)]
    pub hpss: Option<StoreEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreEntry {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub file_names: Option<FileNames>,
    #[serde(default)]
    pub defaults: BTreeMap<String, Template>,
    #[serde(default)]
    pub archive_internal_dirs: Option<Vec<Template>>,
    #[serde(default)]
    pub archive_file_names: Option<FileNames>,
    #[serde(default)]
    pub archive_format: Option<ArchiveFormat>,
}

/// File name templates, either one list for every request or keyed by file
/// set and optionally by file format.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FileNames {
    List(Vec<Template>),
    BySet(BTreeMap<FileSet, SetNames>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SetNames {
    List(Vec<Template>),
    ByFormat(BTreeMap<FileFormat, Vec<Template>>),
}

impl FileNames {
    pub fn select(&self, file_set: FileSet, format: Option<FileFormat>) -> Option<&[Template]> {
        let names = match self {
            FileNames::List(names) => names.as_slice(),
            FileNames::BySet(sets) => match sets.get(&file_set)? {
                SetNames::List(names) => names.as_slice(),
                SetNames::ByFormat(formats) => formats.get(&format?)?.as_slice(),
            },
        };
        (!names.is_empty()).then_some(names)
    }
}

/// A base location. A group lists sibling locations that are paired one to
/// one with the file templates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Single(Template),
    Group(Vec<Template>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Per-file addressable tape archive read with `htar`.
    #[default]
    Htar,
    /// Monolithic zip container fetched whole, then unpacked.
    Zip,
}

impl ArchiveFormat {
    pub fn scheme(&self) -> &'static str {
        match self {
            ArchiveFormat::Htar => "htar",
            ArchiveFormat::Zip => "zip",
        }
    }
}

/// Validated, read-only data locations.
#[derive(Debug, Clone)]
pub struct DataLocations {
    data_types: BTreeMap<String, DataTypeConfig>,
}

impl DataLocations {
    pub fn data_type(&self, name: &str) -> Result<&DataTypeConfig, RetrieveError> {
        self.data_types
            .get(name)
            .ok_or_else(|| RetrieveError::UnknownDataType(name.to_string()))
    }

    pub fn data_type_names(&self) -> impl Iterator<Item = &str> {
        self.data_types.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct DataTypeConfig {
    name: String,
    file_names: FileNames,
    defaults: BTreeMap<String, Template>,
    stores: BTreeMap<DataStore, StoreConfig>,
}

impl DataTypeConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defaults(&self) -> &BTreeMap<String, Template> {
        &self.defaults
    }

    /// Canonical file name templates for this data type.
    pub fn file_names(
        &self,
        file_set: FileSet,
        format: Option<FileFormat>,
    ) -> Result<&[Template], RetrieveError> {
        self.file_names
            .select(file_set, format)
            .ok_or_else(|| RetrieveError::MissingFileNames {
                data_type: self.name.clone(),
                context: describe_selection(file_set, format),
            })
    }

    pub fn store(&self, store: DataStore) -> Result<&StoreConfig, RetrieveError> {
        self.stores
            .get(&store)
            .ok_or_else(|| RetrieveError::StoreNotConfigured {
                data_type: self.name.clone(),
                store: store.to_string(),
            })
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub locations: Vec<Location>,
    pub file_names: Option<FileNames>,
    pub defaults: BTreeMap<String, Template>,
    pub archive: Option<ArchiveConfig>,
}

impl StoreConfig {
    /// Store-specific file name templates, if the store overrides them.
    pub fn file_names(&self, file_set: FileSet, format: Option<FileFormat>) -> Option<&[Template]> {
        self.file_names.as_ref()?.select(file_set, format)
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub internal_dirs: Vec<Template>,
    pub file_names: FileNames,
    pub format: ArchiveFormat,
}

impl ArchiveConfig {
    pub fn file_names(&self, file_set: FileSet, format: Option<FileFormat>) -> Option<&[Template]> {
        self.file_names.select(file_set, format)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: &Path) -> Result<DataLocations, RetrieveError> {
        if !path.exists() {
            return Err(RetrieveError::MissingConfig(path.to_path_buf()));
        }
        let content =
            fs::read_to_string(path).map_err(|_| RetrieveError::ConfigRead(path.to_path_buf()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<DataLocations, RetrieveError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|err| RetrieveError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<DataLocations, RetrieveError> {
        let data_types = config
            .data_types
            .into_iter()
            .map(|(name, entry)| {
                let resolved = Self::resolve_data_type(&name, entry)?;
                Ok((name, resolved))
            })
            .collect::<Result<BTreeMap<_, _>, RetrieveError>>()?;
        Ok(DataLocations { data_types })
    }

    /// `<config dir>/nwp-retrieve/data_locations.yml` for the current user.
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| {
            dirs.config_dir()
                .join("nwp-retrieve")
                .join("data_locations.yml")
        })
    }

    fn resolve_data_type(name: &str, entry: DataTypeEntry) -> Result<DataTypeConfig, RetrieveError> {
        let mut stores = BTreeMap::new();
        for (store, store_entry) in [
            (DataStore::Disk, entry.disk),
            (DataStore::Aws, entry.aws),
            (DataStore::Nomads, entry.nomads),
            (DataStore::Hpss, entry.hpss),
        ] {
            if let Some(store_entry) = store_entry {
                stores.insert(store, Self::resolve_store(name, store, store_entry)?);
            }
        }

        Ok(DataTypeConfig {
            name: name.to_string(),
            file_names: entry.file_names,
            defaults: entry.defaults,
            stores,
        })
    }

    fn resolve_store(
        data_type: &str,
        store: DataStore,
        entry: StoreEntry,
    ) -> Result<StoreConfig, RetrieveError> {
        let invalid = |message: &str| {
            RetrieveError::InvalidConfig(format!("{data_type}.{store}: {message}"))
        };

        if store == DataStore::Disk {
            if !entry.locations.is_empty() {
                return Err(invalid("disk locations come from the input path"));
            }
        } else if entry.locations.is_empty() {
            return Err(invalid("at least one location is required"));
        }

        let archive = match (entry.archive_internal_dirs, entry.archive_file_names) {
            (Some(internal_dirs), Some(file_names)) => {
                if internal_dirs.is_empty() {
                    return Err(invalid("archive_internal_dirs must not be empty"));
                }
                if entry
                    .locations
                    .iter()
                    .any(|location| matches!(location, Location::Group(_)))
                {
                    return Err(invalid("archive locations cannot be grouped"));
                }
                Some(ArchiveConfig {
                    internal_dirs,
                    file_names,
                    format: entry.archive_format.unwrap_or_default(),
                })
            }
            (None, None) if entry.archive_format.is_none() => None,
            _ => {
                return Err(invalid(
                    "archive stores need both archive_internal_dirs and archive_file_names",
                ));
            }
        };

        match store {
            DataStore::Hpss if archive.is_none() => {
                return Err(invalid("hpss is an archive store and needs archive settings"));
            }
            DataStore::Disk if archive.is_some() => {
                return Err(invalid("disk cannot be archive-backed"));
            }
            _ => {}
        }

        Ok(StoreConfig {
            locations: entry.locations,
            file_names: entry.file_names,
            defaults: entry.defaults,
            archive,
        })
    }
}

fn describe_selection(file_set: FileSet, format: Option<FileFormat>) -> String {
    match format {
        Some(format) => format!("file set {file_set}, format {format}"),
        None => format!("file set {file_set}, no format"),
    }
}
