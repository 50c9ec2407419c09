use std::fmt;

use chrono::TimeDelta;

use crate::config::{ArchiveFormat, Location};
use crate::domain::Member;
use crate::error::RetrieveError;
use crate::manifest::{ContextBuilder, Manifest, join_location};
use crate::template::Template;

/// Locator of a file inside an archive container:
/// `scheme://archive/path.tar?internal/dir/file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveAddress {
    pub format: ArchiveFormat,
    pub archive: String,
    pub member: String,
}

impl ArchiveAddress {
    pub fn parse(address: &str) -> Option<Self> {
        let (format, rest) = if let Some(rest) = address.strip_prefix("htar://") {
            (ArchiveFormat::Htar, rest)
        } else if let Some(rest) = address.strip_prefix("zip://") {
            (ArchiveFormat::Zip, rest)
        } else {
            return None;
        };
        let (archive, member) = rest.split_once('?')?;
        if archive.is_empty() || member.is_empty() {
            return None;
        }
        Some(Self {
            format,
            archive: archive.to_string(),
            member: member.to_string(),
        })
    }
}

impl fmt::Display for ArchiveAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}?{}",
            self.format.scheme(),
            self.archive,
            self.member
        )
    }
}

/// Lazily yields one [`Manifest`] per archive location, internal directory
/// and archive name, in that nesting order. Archive naming schemes differ
/// between eras, so every known permutation is enumerated and the transfer
/// outcome decides which one exists for the cycle.
#[derive(Debug, Clone)]
pub struct ArchiveCandidates<'a> {
    locations: Vec<&'a Template>,
    internal_dirs: &'a [Template],
    archive_names: &'a [Template],
    format: ArchiveFormat,
    templates: &'a [Template],
    lead_times: &'a [TimeDelta],
    members: &'a [Member],
    context: ContextBuilder<'a>,
    next: usize,
}

impl<'a> ArchiveCandidates<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        locations: &'a [Location],
        internal_dirs: &'a [Template],
        archive_names: &'a [Template],
        format: ArchiveFormat,
        templates: &'a [Template],
        lead_times: &'a [TimeDelta],
        members: &'a [Member],
        context: ContextBuilder<'a>,
    ) -> Self {
        let locations = locations
            .iter()
            .flat_map(|location| match location {
                Location::Single(base) => std::slice::from_ref(base),
                Location::Group(bases) => bases.as_slice(),
            })
            .collect();
        Self {
            locations,
            internal_dirs,
            archive_names,
            format,
            templates,
            lead_times,
            members,
            context,
            next: 0,
        }
    }

    fn total(&self) -> usize {
        self.locations.len() * self.internal_dirs.len() * self.archive_names.len()
    }

    fn manifest_for(
        &self,
        location: &Template,
        internal_dir: &Template,
        archive_name: &Template,
    ) -> Result<Manifest, RetrieveError> {
        let mut manifest = Manifest::new();
        for member in self.members {
            let prefix = member.prefix();
            for lead_time in self.lead_times {
                let context = self.context.build(*lead_time, *member)?;
                let archive = join_location(
                    &location.render(&context)?,
                    &archive_name.render(&context)?,
                );
                let internal_dir = internal_dir.render(&context)?;
                for template in self.templates {
                    let name = template.render(&context)?;
                    let address = ArchiveAddress {
                        format: self.format,
                        archive: archive.clone(),
                        member: join_location(&internal_dir, &name),
                    };
                    manifest.insert(format!("{prefix}{name}"), address.to_string());
                }
            }
        }
        Ok(manifest)
    }
}

impl Iterator for ArchiveCandidates<'_> {
    type Item = Result<Manifest, RetrieveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total() {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let names = self.archive_names.len();
        let per_location = self.internal_dirs.len() * names;
        let location = self.locations[index / per_location];
        let internal_dir = &self.internal_dirs[index / names % self.internal_dirs.len()];
        let archive_name = &self.archive_names[index % names];
        Some(self.manifest_for(location, internal_dir, archive_name))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        let text = "htar:///NCEPPROD/rh2025/com_gfs.tar?./gfs.20250504/00/atmos/gfs.t00z.atmf006.nc";
        let address = ArchiveAddress::parse(text).unwrap();
        assert_eq!(address.format, ArchiveFormat::Htar);
        assert_eq!(address.archive, "/NCEPPROD/rh2025/com_gfs.tar");
        assert_eq!(address.member, "./gfs.20250504/00/atmos/gfs.t00z.atmf006.nc");
        assert_eq!(address.to_string(), text);
    }

    #[test]
    fn zip_address_over_http() {
        let address = ArchiveAddress::parse("zip://https://host/data/fix.zip?fix/grid.nc").unwrap();
        assert_eq!(address.format, ArchiveFormat::Zip);
        assert_eq!(address.archive, "https://host/data/fix.zip");
        assert_eq!(address.member, "fix/grid.nc");
    }

    #[test]
    fn non_archive_addresses() {
        assert!(ArchiveAddress::parse("/plain/path").is_none());
        assert!(ArchiveAddress::parse("htar:///no/member").is_none());
    }
}
