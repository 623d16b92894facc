//! Unit tests for log format selection

use voltwatch::logging::LogFormat;

#[test]
fn production_defaults_to_json() {
    assert_eq!(LogFormat::resolve("production", None), LogFormat::Json);
    assert_eq!(LogFormat::resolve("sandbox", None), LogFormat::Pretty);
}

#[test]
fn explicit_format_wins() {
    assert_eq!(LogFormat::resolve("production", Some("pretty")), LogFormat::Pretty);
    assert_eq!(LogFormat::resolve("sandbox", Some("JSON")), LogFormat::Json);
    assert_eq!(LogFormat::resolve("sandbox", Some("unknown")), LogFormat::Pretty);
}

#[test]
fn file_writer_rolls_into_prefixed_files() {
    use std::io::Write;
    use voltwatch::logging::{rolling_file_writer, LOG_FILE_PREFIX};

    let dir = std::env::temp_dir().join(format!("voltwatch-logs-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let (mut writer, guard) = tokio_test::assert_ok!(rolling_file_writer(&dir));
    writer.write_all(b"watcher started for BTCUSDT\n").unwrap();
    drop(writer);
    drop(guard);

    let files: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log"))
        })
        .collect();
    assert_eq!(files.len(), 1);
    let contents = std::fs::read_to_string(&files[0]).unwrap();
    assert!(contents.contains("watcher started for BTCUSDT"));

    std::fs::remove_dir_all(&dir).ok();
}
