use chrono::NaiveDate;
use std::path::PathBuf;
use zooniverse_stats::loader::{InputSource, LoadOptions, load};
use zooniverse_stats::plot::{parse_colour, plot_time_bar, plot_user_distribution};
use zooniverse_stats::report::Summary;
use zooniverse_stats::resample::{Sampling, classifications_by_time, users_by_time};
use zooniverse_stats::snapshot::{save_snapshot, write_csv};
use zooniverse_stats::users::UsersTable;

fn fixture() -> InputSource {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/classifications.csv");
    InputSource::Export(path.to_string_lossy().into_owned())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_full_pipeline() {
    let table = load(&fixture(), &LoadOptions::default()).expect("Failed to load export");
    assert_eq!(table.len(), 10);

    let users = UsersTable::from_table(&table).unwrap();
    assert_eq!(users.total_users, 4);
    assert_eq!(users.total_classifications, 10);
    assert!((users.gini_coefficient - 0.15).abs() < 1e-9);

    let summary = Summary::from_users(&users);
    assert_eq!(summary.anonymous_users, 1);
    assert!((summary.top_shares[0].1 - 100.0).abs() < 1e-9);
    assert!(summary.to_string().contains("Total users:"));
}

#[test]
fn test_non_live_rows_kept_on_request() {
    let options = LoadOptions {
        live_only: false,
        ..LoadOptions::default()
    };
    let table = load(&fixture(), &options).unwrap();
    assert_eq!(table.len(), 12);
    assert!(!table.get("1012").unwrap().is_live());
}

#[test]
fn test_date_filtered_pipeline() {
    let options = LoadOptions::from_args(Some("2018-02-06"), Some("2018-03-01"), true).unwrap();
    let table = load(&fixture(), &options).unwrap();
    assert_eq!(table.len(), 6);

    let users = UsersTable::from_table(&table).unwrap();
    let sum: u64 = users.ascending().iter().map(|r| r.classifications).sum();
    assert_eq!(sum, 6);
}

#[test]
fn test_weekly_and_monthly_buckets() {
    let table = load(&fixture(), &LoadOptions::default()).unwrap();

    let weekly = classifications_by_time(&table, Sampling::Week);
    let weeks: Vec<(NaiveDate, u64)> = weekly.buckets.iter().map(|b| (b.label, b.number)).collect();
    assert_eq!(
        weeks,
        vec![
            (date(2018, 2, 11), 4),
            (date(2018, 2, 18), 2),
            (date(2018, 2, 25), 2),
            (date(2018, 3, 4), 2),
        ]
    );

    let monthly = classifications_by_time(&table, Sampling::Month);
    let totals: Vec<u64> = monthly.buckets.iter().map(|b| b.total).collect();
    assert_eq!(totals, vec![8, 10]);

    let new_users = users_by_time(&table, Sampling::Week, None, None);
    let numbers: Vec<u64> = new_users.buckets.iter().map(|b| b.number).collect();
    assert_eq!(numbers, vec![2, 1, 0, 1]);
}

#[test]
fn test_users_window_without_new_users() {
    let table = load(&fixture(), &LoadOptions::default()).unwrap();
    let after_everything = LoadOptions::from_args(Some("2030-01-01"), None, true)
        .unwrap()
        .from_date;

    let series = users_by_time(&table, Sampling::Week, after_everything, None);
    assert!(series.is_empty());

    // the report skips this chart rather than failing before the summary
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users-week.svg");
    let colour = parse_colour("#dc2d4c").unwrap();
    assert!(plot_time_bar(&series, "Users", colour, &path, true).is_err());
    assert!(!path.exists());

    let users = UsersTable::from_table(&table).unwrap();
    assert!(Summary::from_users(&users).to_string().contains("Total users:"));
}

#[test]
fn test_charts_and_exports_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let table = load(&fixture(), &LoadOptions::default()).unwrap();
    let users = UsersTable::from_table(&table).unwrap();
    let colour = parse_colour("#dc2d4c").unwrap();

    for sampling in Sampling::ALL {
        let path = dir.path().join(format!("test-classifications-{sampling}.svg"));
        plot_time_bar(&classifications_by_time(&table, sampling), "Classifications", colour, &path, true)
            .unwrap();
        assert!(path.exists());
    }

    let path = dir.path().join("test-user-distribution.svg");
    plot_user_distribution(&users, colour, &path).unwrap();
    assert!(path.exists());

    let snapshot = dir.path().join("classifications.jsonl.gz");
    save_snapshot(&table, &snapshot).unwrap();
    let reloaded = load(&InputSource::Snapshot(snapshot), &LoadOptions::default()).unwrap();
    assert_eq!(reloaded.events(), table.events());

    let csv = dir.path().join("classifications.csv");
    write_csv(&table, &csv).unwrap();
    let exported = load(
        &InputSource::Export(csv.to_string_lossy().into_owned()),
        &LoadOptions::default(),
    )
    .unwrap();
    assert_eq!(exported.len(), table.len());
    assert_eq!(exported.get("1001").unwrap().task_duration(), 30.0);
}
