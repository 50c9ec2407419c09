use assert_matches::assert_matches;
use chrono::TimeDelta;

use nwp_retrieve::domain::{DataStore, Member, parse_lead_times, parse_members};
use nwp_retrieve::error::RetrieveError;

fn tokens(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn forecast_hour_shorthand() {
    assert_eq!(
        parse_lead_times(&tokens(&["0", "12", "6"])).unwrap(),
        vec![TimeDelta::hours(0), TimeDelta::hours(6), TimeDelta::hours(12)]
    );
    assert_eq!(
        parse_lead_times(&tokens(&["6"])).unwrap(),
        vec![TimeDelta::hours(6)]
    );
    assert_eq!(
        parse_lead_times(&tokens(&["3", "4"])).unwrap(),
        vec![TimeDelta::hours(3), TimeDelta::hours(4)]
    );
}

#[test]
fn explicit_sub_hourly_lead_times() {
    assert_eq!(
        parse_lead_times(&tokens(&["0:15", "0:30", "1"])).unwrap(),
        vec![
            TimeDelta::minutes(15),
            TimeDelta::minutes(30),
            TimeDelta::hours(1)
        ]
    );
    assert_matches!(
        parse_lead_times(&tokens(&["six"])),
        Err(RetrieveError::InvalidLeadTime(_))
    );
}

#[test]
fn member_ranges() {
    assert_eq!(
        parse_members(&tokens(&["1", "5", "2"])).unwrap(),
        vec![Member::Ensemble(1), Member::Ensemble(3), Member::Ensemble(5)]
    );
    assert_matches!(
        parse_members(&tokens(&["-3"])),
        Err(RetrieveError::InvalidRange(_))
    );
}

#[test]
fn store_names() {
    assert_eq!("hpss".parse::<DataStore>().unwrap(), DataStore::Hpss);
    assert_matches!(
        "ftp".parse::<DataStore>(),
        Err(RetrieveError::UnsupportedStore(name)) if name == "ftp"
    );
}
