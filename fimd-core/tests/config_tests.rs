//! Configuration loading, validation and calendar parsing tests.
//! Each test writes its own file under an isolated `TempDir`.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use assert_fs::prelude::*;
use chrono::{NaiveTime, Weekday};
use fimd_core::{config, AgentConfig, ConfigError, LogFormat, ScanDays, ScanTime};
use predicates::prelude::predicate;
use rstest::rstest;

const FULL_CONFIG: &str = r#"
settle_delay_secs: 30
process_priority: 5
send_delay_us: 250
frequency_secs: 3600
scan_time: "02:00"
scan_day: monday
enable_inventory: true
directories:
  - path: /etc
    realtime: true
  - path: /usr/bin
    whodata: true
  - path: /var/www
    realtime: true
    whodata: true
queue_path: /tmp/fimd/queue
diff_dir: /tmp/fimd/diff
control_socket: /tmp/fimd/control.sock
restart_marker: /tmp/fimd/.rescan
scan_command: ["/usr/libexec/fimd-scan", "--all"]
rootcheck:
  command: ["/usr/libexec/rootcheck"]
  interval_secs: 36000
inventory:
  command: ["/usr/libexec/fimd-inventory"]
  interval_secs: 300
log_format: json
"#;

// ---------------------------------------------------------------------------
// 1. Loading
// ---------------------------------------------------------------------------

#[test]
fn load_missing_file_returns_not_found() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(&dir.path().join("fimd.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("fimd.yaml"));
}

#[test]
fn load_full_config_populates_every_field() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("fimd.yaml");
    file.write_str(FULL_CONFIG).expect("write");
    file.assert(predicate::path::exists());

    let cfg = config::load_at(file.path()).expect("load");
    assert_eq!(cfg.settle_delay(), Duration::from_secs(30));
    assert_eq!(cfg.process_priority, 5);
    assert_eq!(cfg.send_delay(), Duration::from_micros(250));
    assert_eq!(cfg.scan_time.map(|t| t.time()), NaiveTime::from_hms_opt(2, 0, 0));
    assert_eq!(cfg.scan_day, Some(ScanDays::single(Weekday::Mon)));
    assert!(cfg.enable_inventory);
    assert_eq!(cfg.directories.len(), 3);
    assert_eq!(cfg.log_format, LogFormat::Json);
    assert_eq!(
        cfg.scan_command.as_ref().and_then(|c| c.program()),
        Some("/usr/libexec/fimd-scan")
    );
    assert_eq!(cfg.inventory.as_ref().map(|j| j.interval()), Some(Duration::from_secs(300)));
}

#[test]
fn minimal_config_uses_defaults() {
    let cfg = config::parse("{}", Path::new("inline.yaml")).expect("parse");
    assert_eq!(cfg, AgentConfig::default());
    assert_eq!(cfg.effective_frequency(), Duration::from_secs(43_200));
    assert!(!cfg.has_calendar_trigger());
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("broken.yaml");
    file.write_str("directories: [unclosed\n  - : :").expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("broken.yaml"));
}

#[test]
fn bad_scan_time_surfaces_as_parse_error() {
    let err = config::parse("scan_time: \"25:99\"\n", Path::new("inline.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Derived values
// ---------------------------------------------------------------------------

#[test]
fn calendar_trigger_forces_weekly_frequency() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("fimd.yaml");
    file.write_str(FULL_CONFIG).expect("write");
    let cfg = config::load_at(file.path()).expect("load");

    assert!(cfg.has_calendar_trigger());
    assert_eq!(cfg.frequency_secs, 3600, "loaded value is left untouched");
    assert_eq!(cfg.effective_frequency(), Duration::from_secs(604_800));
}

#[test]
fn day_only_trigger_also_forces_weekly_frequency() {
    let cfg = config::parse("frequency_secs: 60\nscan_day: weekends\n", Path::new("x.yaml"))
        .expect("parse");
    assert_eq!(cfg.effective_frequency(), Duration::from_secs(604_800));
}

#[test]
fn whodata_directories_keep_one_based_positions() {
    let cfg = config::parse(FULL_CONFIG, Path::new("x.yaml")).expect("parse");
    let whodata: Vec<(usize, String)> = cfg
        .whodata_directories()
        .map(|(p, d)| (p.get(), d.path.display().to_string()))
        .collect();
    assert_eq!(
        whodata,
        vec![(2, "/usr/bin".to_string()), (3, "/var/www".to_string())]
    );
    assert!(cfg.whodata_directories().all(|(p, _)| p >= NonZeroUsize::MIN));

    let realtime: Vec<_> = cfg.realtime_directories().map(|d| d.path.clone()).collect();
    assert_eq!(realtime.len(), 2);
    assert_eq!(cfg.diff_cache_dir(), Path::new("/tmp/fimd/diff/local"));
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

#[rstest]
#[case("directories:\n  - path: relative/dir\n", "directories")]
#[case("directories:\n  - path: /etc\n  - path: /etc\n", "directories")]
#[case("queue_path: \"\"\n", "queue_path")]
#[case("scan_command: []\n", "scan_command")]
#[case("rootcheck:\n  command: [\"/bin/true\"]\n  interval_secs: 0\n", "rootcheck")]
#[case("inventory:\n  command: []\n  interval_secs: 10\n", "inventory")]
fn invalid_values_are_rejected(#[case] yaml: &str, #[case] expected_field: &str) {
    let err = config::parse(yaml, Path::new("x.yaml")).unwrap_err();
    match err {
        ConfigError::Invalid { field, .. } => assert_eq!(field, expected_field),
        other => panic!("expected Invalid, got: {other}"),
    }
}

// ---------------------------------------------------------------------------
// 4. Calendar values
// ---------------------------------------------------------------------------

#[rstest]
#[case("02:00", 2, 0, 0)]
#[case("02:00:30", 2, 0, 30)]
#[case(" 23:59 ", 23, 59, 0)]
fn scan_time_parses(#[case] raw: &str, #[case] h: u32, #[case] m: u32, #[case] s: u32) {
    let parsed: ScanTime = raw.parse().expect("parse");
    assert_eq!(Some(parsed.time()), NaiveTime::from_hms_opt(h, m, s));
}

#[rstest]
#[case("2am")]
#[case("")]
#[case("12:60")]
fn scan_time_rejects_garbage(#[case] raw: &str) {
    assert!(raw.parse::<ScanTime>().is_err());
}

#[rstest]
#[case("monday", &[Weekday::Mon])]
#[case("Sat,sun", &[Weekday::Sat, Weekday::Sun])]
#[case("weekends", &[Weekday::Sat, Weekday::Sun])]
#[case("weekdays", &[Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri])]
#[case("friday, weekends", &[Weekday::Fri, Weekday::Sat, Weekday::Sun])]
fn scan_days_parse(#[case] raw: &str, #[case] expected: &[Weekday]) {
    let parsed: ScanDays = raw.parse().expect("parse");
    let days: Vec<Weekday> = parsed.days().collect();
    assert_eq!(days, expected);
}

#[rstest]
#[case("someday")]
#[case(",")]
fn scan_days_reject_garbage(#[case] raw: &str) {
    assert!(raw.parse::<ScanDays>().is_err());
}

#[test]
fn calendar_values_serialize_back_to_strings() {
    let cfg = config::parse("scan_time: \"02:00\"\nscan_day: sunday,monday\n", Path::new("x"))
        .expect("parse");
    let yaml = serde_yaml::to_string(&cfg).expect("serialize");
    assert!(yaml.contains("02:00:00"), "got: {yaml}");
    assert!(yaml.contains("mon,sun"), "got: {yaml}");
}
