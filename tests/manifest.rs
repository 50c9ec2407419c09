use std::collections::BTreeSet;

use chrono::{TimeDelta, TimeZone, Utc};

use nwp_retrieve::config::{ConfigLoader, DataLocations};
use nwp_retrieve::domain::{DataStore, FileFormat, FileSet, Member};
use nwp_retrieve::manifest::{Combinations, ContextBuilder, Manifest};

const GFS: &str = r#"
GFS:
  file_names:
    anl:
      - gfs.t{{ cycle.strftime('%H') }}z.atmanl.nc
    fcst:
      netcdf:
        - gfs.t{{ cycle.strftime('%H') }}z.atmf{{ "%03d" % lead_time.hours }}.nc
        - gfs.t{{ cycle.strftime('%H') }}z.sfcf{{ "%03d" % lead_time.hours }}.nc
  defaults:
    ymd: "{{ cycle.strftime('%Y%m%d') }}"
  aws:
    locations:
      - https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.{{ ymd }}/{{ hh }}/atmos
      - https://noaa-gfs-warm.s3.amazonaws.com/gfs.{{ ymd }}/{{ hh }}/atmos
    defaults:
      hh: "{{ cycle.strftime('%H') }}"
"#;

fn locations() -> DataLocations {
    ConfigLoader::parse(GFS).unwrap()
}

fn aws_manifests(locations: &DataLocations, lead_hours: &[i64]) -> Vec<Manifest> {
    let gfs = locations.data_type("GFS").unwrap();
    let aws = gfs.store(DataStore::Aws).unwrap();
    let templates = gfs.file_names(FileSet::Fcst, Some(FileFormat::Netcdf)).unwrap();
    let leads: Vec<TimeDelta> = lead_hours.iter().map(|h| TimeDelta::hours(*h)).collect();
    let members = [Member::Deterministic];
    let cycle = Utc.with_ymd_and_hms(2025, 5, 4, 0, 0, 0).unwrap();
    let context = ContextBuilder::new(cycle)
        .with_defaults(gfs.defaults())
        .with_defaults(&aws.defaults);

    Combinations::new(&aws.locations, templates, &leads, &members, context)
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn gfs_forecast_names_from_aws() {
    let locations = locations();
    let manifests = aws_manifests(&locations, &[6, 9, 12]);
    assert_eq!(manifests.len(), 2);

    let keys: BTreeSet<&str> = manifests[0].targets().collect();
    let expected: BTreeSet<&str> = [
        "gfs.t00z.atmf006.nc",
        "gfs.t00z.sfcf006.nc",
        "gfs.t00z.atmf009.nc",
        "gfs.t00z.sfcf009.nc",
        "gfs.t00z.atmf012.nc",
        "gfs.t00z.sfcf012.nc",
    ]
    .into_iter()
    .collect();
    assert_eq!(keys, expected);
    assert_eq!(
        manifests[0].get("gfs.t00z.atmf006.nc"),
        Some("https://noaa-gfs-bdp-pds.s3.amazonaws.com/gfs.20250504/00/atmos/gfs.t00z.atmf006.nc")
    );
    assert_eq!(
        manifests[1].get("gfs.t00z.sfcf012.nc"),
        Some("https://noaa-gfs-warm.s3.amazonaws.com/gfs.20250504/00/atmos/gfs.t00z.sfcf012.nc")
    );
}

#[test]
fn generation_is_deterministic() {
    let locations = locations();
    let first = aws_manifests(&locations, &[0, 3, 6]);
    let second = aws_manifests(&locations, &[0, 3, 6]);
    assert_eq!(first, second);
    assert_eq!(
        first[0].targets().collect::<Vec<_>>(),
        second[0].targets().collect::<Vec<_>>()
    );
}

#[test]
fn ensemble_targets_carry_member_prefix() {
    let locations = locations();
    let gfs = locations.data_type("GFS").unwrap();
    let aws = gfs.store(DataStore::Aws).unwrap();
    let templates = gfs.file_names(FileSet::Anl, None).unwrap();
    let leads = [TimeDelta::zero()];
    let members = [Member::Ensemble(1), Member::Ensemble(2)];
    let cycle = Utc.with_ymd_and_hms(2025, 5, 4, 12, 0, 0).unwrap();
    let context = ContextBuilder::new(cycle)
        .with_defaults(gfs.defaults())
        .with_defaults(&aws.defaults);

    let manifest = Combinations::new(&aws.locations, templates, &leads, &members, context)
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(
        manifest.targets().collect::<Vec<_>>(),
        vec!["mem001/gfs.t12z.atmanl.nc", "mem002/gfs.t12z.atmanl.nc"]
    );
}
