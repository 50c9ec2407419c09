use chrono::{TimeDelta, TimeZone, Utc};

use nwp_retrieve::archive::{ArchiveAddress, ArchiveCandidates};
use nwp_retrieve::config::{ArchiveFormat, ConfigLoader};
use nwp_retrieve::domain::{DataStore, FileFormat, FileSet, Member};
use nwp_retrieve::manifest::{ContextBuilder, Manifest};

const HPSS: &str = r#"
GFS:
  file_names:
    fcst:
      grib2:
        - gfs.t{{ cycle.strftime('%H') }}z.pgrb2.0p25.f{{ "%03d" % lead_time.hours }}
  hpss:
    locations:
      - /NCEPPROD/hpssprod/runhistory/rh{{ cycle.strftime('%Y') }}/{{ cycle.strftime('%Y%m') }}/{{ cycle.strftime('%Y%m%d') }}
    archive_internal_dirs:
      - ./gfs.{{ cycle.strftime('%Y%m%d') }}/{{ cycle.strftime('%H') }}/atmos
      - ./gfs.{{ cycle.strftime('%Y%m%d') }}/{{ cycle.strftime('%H') }}
    archive_file_names:
      fcst:
        grib2:
          - gpfs_dell1_nco_ops_com_gfs_prod_gfs.{{ cycle.strftime('%Y%m%d_%H') }}.gfs_pgrb2.tar
          - com_gfs_prod_gfs.{{ cycle.strftime('%Y%m%d_%H') }}.gfs_pgrb2.tar
"#;

fn candidates() -> Vec<Manifest> {
    let locations = ConfigLoader::parse(HPSS).unwrap();
    let gfs = locations.data_type("GFS").unwrap();
    let hpss = gfs.store(DataStore::Hpss).unwrap();
    let archive = hpss.archive.as_ref().unwrap();
    let names = archive
        .file_names(FileSet::Fcst, Some(FileFormat::Grib2))
        .unwrap();
    let templates = gfs.file_names(FileSet::Fcst, Some(FileFormat::Grib2)).unwrap();
    let leads = [TimeDelta::hours(6)];
    let members = [Member::Deterministic];
    let cycle = Utc.with_ymd_and_hms(2025, 5, 4, 0, 0, 0).unwrap();

    ArchiveCandidates::new(
        &hpss.locations,
        &archive.internal_dirs,
        names,
        archive.format,
        templates,
        &leads,
        &members,
        ContextBuilder::new(cycle),
    )
    .collect::<Result<Vec<_>, _>>()
    .unwrap()
}

fn address(manifest: &Manifest) -> ArchiveAddress {
    let source = manifest.get("gfs.t00z.pgrb2.0p25.f006").unwrap();
    ArchiveAddress::parse(source).unwrap()
}

#[test]
fn enumerates_directory_then_archive_name() {
    let manifests = candidates();
    assert_eq!(manifests.len(), 4);

    let first = address(&manifests[0]);
    assert_eq!(first.format, ArchiveFormat::Htar);
    assert_eq!(
        first.archive,
        "/NCEPPROD/hpssprod/runhistory/rh2025/202505/20250504/\
         gpfs_dell1_nco_ops_com_gfs_prod_gfs.20250504_00.gfs_pgrb2.tar"
    );
    assert_eq!(first.member, "./gfs.20250504/00/atmos/gfs.t00z.pgrb2.0p25.f006");

    let second = address(&manifests[1]);
    assert!(second.archive.ends_with("/com_gfs_prod_gfs.20250504_00.gfs_pgrb2.tar"));
    assert_eq!(second.member, first.member);

    let third = address(&manifests[2]);
    assert_eq!(third.archive, first.archive);
    assert_eq!(third.member, "./gfs.20250504/00/gfs.t00z.pgrb2.0p25.f006");
}

#[test]
fn addresses_use_htar_scheme() {
    for manifest in candidates() {
        for (_, source) in &manifest {
            assert!(source.starts_with("htar:///NCEPPROD/"), "{source}");
            assert!(source.contains(".tar?./gfs.20250504/00"), "{source}");
        }
    }
}
