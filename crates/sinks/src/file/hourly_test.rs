use super::*;
use chrono::TimeZone;
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

/// Clock the test moves by hand
#[derive(Clone)]
struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    fn at(hour: u32) -> Self {
        Self(Arc::new(Mutex::new(utc(hour))))
    }

    fn set(&self, now: DateTime<Utc>) {
        *self.0.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

fn utc(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2013, 8, 13, hour, 42, 7).unwrap()
}

async fn deliver<H: BatchHandler<String>>(handler: &mut H, lines: &[&str]) -> bool {
    let batch: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
    handler.handle(&batch).await
}

async fn finish<H: BatchHandler<String>>(handler: &mut H) -> Result<(), HandlerError> {
    handler.finalize().await
}

#[test]
fn test_rolled_path_with_extension() {
    assert_eq!(
        rolled_path(Path::new("test.log"), utc(15)),
        PathBuf::from("test-2013-08-13T15.log")
    );
}

#[test]
fn test_rolled_path_without_extension() {
    assert_eq!(
        rolled_path(Path::new("test"), utc(15)),
        PathBuf::from("test-2013-08-13T15")
    );
}

#[test]
fn test_rolled_path_uses_last_dot() {
    assert_eq!(
        rolled_path(Path::new("test.somemore.log"), utc(15)),
        PathBuf::from("test.somemore-2013-08-13T15.log")
    );
}

#[test]
fn test_rolled_path_ignores_dots_in_directories() {
    assert_eq!(
        rolled_path(Path::new("/home/bla/karli.lotti/test.log"), utc(15)),
        PathBuf::from("/home/bla/karli.lotti/test-2013-08-13T15.log")
    );
    assert_eq!(
        rolled_path(Path::new("/var/log.d/events"), utc(3)),
        PathBuf::from("/var/log.d/events-2013-08-13T03")
    );
}

#[test]
fn test_rolled_path_is_utc() {
    let now = chrono::FixedOffset::east_opt(2 * 3600)
        .unwrap()
        .with_ymd_and_hms(2013, 8, 13, 17, 0, 0)
        .unwrap()
        .with_timezone(&Utc);

    assert_eq!(
        rolled_path(Path::new("test.log"), now),
        PathBuf::from("test-2013-08-13T15.log")
    );
}

#[tokio::test]
async fn test_no_file_before_first_batch() {
    let dir = TempDir::new().unwrap();
    let mut writer = HourlyFileWriter::with_clock(dir.path().join("test.log"), ManualClock::at(15));

    assert!(writer.current_path().is_none());
    finish(&mut writer).await.unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_same_hour_appends_to_same_file() {
    let dir = TempDir::new().unwrap();
    let mut writer = HourlyFileWriter::with_clock(dir.path().join("test.log"), ManualClock::at(15));

    assert!(deliver(&mut writer, &["a"]).await);
    assert!(deliver(&mut writer, &["b"]).await);
    finish(&mut writer).await.unwrap();

    let path = dir.path().join("test-2013-08-13T15.log");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "a\nb\n");
}

#[tokio::test]
async fn test_switches_file_when_hour_changes() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::at(15);
    let mut writer = HourlyFileWriter::with_clock(dir.path().join("test.log"), clock.clone());

    assert!(deliver(&mut writer, &["first"]).await);
    let first = dir.path().join("test-2013-08-13T15.log");
    assert_eq!(writer.current_path(), Some(first.as_path()));

    clock.set(utc(16));
    assert!(deliver(&mut writer, &["second"]).await);
    let second = dir.path().join("test-2013-08-13T16.log");
    assert_eq!(writer.current_path(), Some(second.as_path()));

    finish(&mut writer).await.unwrap();

    assert_eq!(std::fs::read_to_string(first).unwrap(), "first\n");
    assert_eq!(std::fs::read_to_string(second).unwrap(), "second\n");
}

#[tokio::test]
async fn test_returning_to_an_hour_appends() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::at(15);
    let mut writer = HourlyFileWriter::with_clock(dir.path().join("test"), clock.clone());

    deliver(&mut writer, &["one"]).await;
    clock.set(utc(16));
    deliver(&mut writer, &["two"]).await;
    clock.set(utc(15));
    deliver(&mut writer, &["three"]).await;
    finish(&mut writer).await.unwrap();

    let path = dir.path().join("test-2013-08-13T15");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "one\nthree\n");
}

#[tokio::test]
async fn test_open_failure_requests_retry() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("later").join("test.log");
    let mut writer = HourlyFileWriter::with_clock(&base, ManualClock::at(15));

    assert!(!deliver(&mut writer, &["kept"]).await);
    assert!(writer.current_path().is_none());

    std::fs::create_dir(dir.path().join("later")).unwrap();
    assert!(deliver(&mut writer, &["kept"]).await);
    finish(&mut writer).await.unwrap();

    let path = dir.path().join("later").join("test-2013-08-13T15.log");
    assert_eq!(std::fs::read_to_string(path).unwrap(), "kept\n");
}

#[test]
fn test_system_clock_writer() {
    let writer = HourlyFileWriter::new("/tmp/events.log");
    assert_eq!(writer.base_path(), Path::new("/tmp/events.log"));
    assert!(format!("{:?}", writer).contains("HourlyFileWriter"));
}
