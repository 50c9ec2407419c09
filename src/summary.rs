use std::fs;
use std::path::Path;

use crate::error::RetrieveError;
use crate::fs_util;
use crate::manifest::Manifest;

/// Writes the winning manifest as a flat YAML mapping of target name to
/// source address, replacing any existing file.
pub fn write_summary(path: &Path, manifest: &Manifest) -> Result<(), RetrieveError> {
    let yaml = serde_yaml::to_string(manifest).map_err(|err| RetrieveError::Summary {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    fs_util::write_bytes_atomic(path, yaml.as_bytes()).map_err(|err| RetrieveError::Summary {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

pub fn read_summary(path: &Path) -> Result<Manifest, RetrieveError> {
    let content =
        fs::read_to_string(path).map_err(|_| RetrieveError::ConfigRead(path.to_path_buf()))?;
    serde_yaml::from_str(&content).map_err(|err| RetrieveError::ConfigParse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_existing_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.yml");
        fs::write(&path, "stale: true\n").unwrap();

        let manifest: Manifest = [("a.nc".to_string(), "/src/a.nc".to_string())]
            .into_iter()
            .collect();
        write_summary(&path, &manifest).unwrap();

        assert_eq!(read_summary(&path).unwrap(), manifest);
    }
}
