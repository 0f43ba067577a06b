use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use fastlog::{log_debug, log_error, log_info, LogLevel, Logger};
use tempfile::TempDir;

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

/// Checks the `[YYYY-MM-DD HH:MM:SS] [LEVEL] ` prefix.
fn is_well_formed(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() < 22 || bytes[0] != b'[' || bytes[20] != b']' {
        return false;
    }
    let stamp_ok = line[1..20].char_indices().all(|(i, c)| match i {
        4 | 7 => c == '-',
        10 => c == ' ',
        13 | 16 => c == ':',
        _ => c.is_ascii_digit(),
    });
    stamp_ok && ["[DEBUG]", "[INFO]", "[ERROR]", "[FATAL]"].iter().any(|l| line[22..].starts_with(l))
}

fn timestamp_of(line: &str) -> &str {
    &line[1..20]
}

#[test]
fn test_single_thread_filtering_and_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("single.log");
    let logger = Logger::builder(&path).background(false).build().unwrap();

    log_info!(logger, "x={} y={}", 1, 2);
    log_error!(logger, "bye");
    log_debug!(logger, "skip");

    logger.drain_once();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2, "the DEBUG message must be filtered at threshold INFO");
    assert!(lines[0].contains("[INFO] "), "line: {}", lines[0]);
    assert!(lines[0].ends_with("x=1 y=2"), "line: {}", lines[0]);
    assert!(lines[1].contains("[ERROR] "), "line: {}", lines[1]);
    assert!(lines[1].ends_with("bye"), "line: {}", lines[1]);
    assert!(lines.iter().all(|l| is_well_formed(l)));
    assert!(
        timestamp_of(&lines[0]) <= timestamp_of(&lines[1]),
        "drain-time timestamps must be non-decreasing"
    );
}

#[test]
fn test_lines_name_their_call_site() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("site.log");
    let logger = Logger::builder(&path).background(false).build().unwrap();

    log_info!(logger, "located");
    logger.drain_once();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert!(
        lines[0].ends_with("logger_tests:located"),
        "the rendered body must carry the call-site prefix, got: {}",
        lines[0]
    );
}

#[test]
fn test_two_producers_preserve_per_thread_order() {
    const PER_THREAD: usize = 10_000;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("two.log");
    let mut logger = Logger::builder(&path)
        .drain_interval(Duration::from_millis(1))
        .build()
        .unwrap();

    thread::scope(|s| {
        for marker in ["alpha", "beta"] {
            let logger = &logger;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    log_info!(logger, "{} seq={}", marker, i);
                }
            });
        }
    });
    logger.stop();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2 * PER_THREAD, "no message may be lost");

    for marker in ["alpha", "beta"] {
        let needle = format!("{} seq=", marker);
        let sequence: Vec<usize> = lines
            .iter()
            .filter_map(|line| line.split(needle.as_str()).nth(1))
            .map(|seq| seq.parse().unwrap())
            .collect();
        let expected: Vec<usize> = (0..PER_THREAD).collect();
        assert_eq!(
            sequence, expected,
            "{} lines must appear in the order their thread produced them",
            marker
        );
    }
}

#[test]
fn test_stop_with_pending_message() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pending.log");
    let mut logger = Logger::builder(&path).build().unwrap();

    log_info!(logger, "pending message");
    logger.stop();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert!(lines.len() <= 1, "one message was produced, at most one line may exist");
    if let Some(line) = lines.first() {
        assert!(is_well_formed(line), "no partial line may reach the sink: {}", line);
        assert!(line.ends_with("pending message"));
        assert!(content.ends_with('\n'));
    }
}

#[test]
fn test_level_change_mid_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("levels.log");
    let logger = Logger::builder(&path).background(false).build().unwrap();

    for i in 0..5 {
        log_debug!(logger, "early debug {}", i);
    }
    for i in 0..5 {
        log_info!(logger, "kept info {}", i);
    }
    logger.set_level(LogLevel::Debug);
    for i in 0..5 {
        log_debug!(logger, "late debug {}", i);
    }

    logger.drain_once();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 10);
    for (i, line) in lines[..5].iter().enumerate() {
        assert!(line.ends_with(&format!("kept info {}", i)), "line: {}", line);
    }
    for (i, line) in lines[5..].iter().enumerate() {
        assert!(line.ends_with(&format!("late debug {}", i)), "line: {}", line);
    }
    assert!(
        !lines.iter().any(|l| l.contains("early debug")),
        "messages below the threshold at call time must not surface later"
    );
}

#[test]
fn test_producer_thread_exit_keeps_messages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exit.log");
    let logger = Logger::builder(&path).background(false).build().unwrap();

    thread::scope(|s| {
        let logger = &logger;
        s.spawn(move || {
            for i in 0..100 {
                log_info!(logger, "exiting seq={}", i);
            }
        });
    });

    // The producer is gone; its queue was handed over with the residue.
    logger.drain_once();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 100, "all messages of an exited thread must survive");
    for (i, line) in lines.iter().enumerate() {
        assert!(line.ends_with(&format!("exiting seq={}", i)), "line: {}", line);
    }
}

#[test]
fn test_oversized_message_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("oversize.log");
    let logger = Logger::builder(&path).background(false).build().unwrap();

    let big = "x".repeat(2 * 1024);
    log_info!(logger, "big {}", big);
    log_info!(logger, "small survives");

    logger.drain_once();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1, "the oversized message is dropped, later ones still flow");
    assert!(lines[0].ends_with("small survives"));
}

#[test]
fn test_independent_loggers_coexist() {
    let dir = TempDir::new().unwrap();
    let first_path = dir.path().join("first.log");
    let second_path = dir.path().join("second.log");
    let first = Logger::builder(&first_path).background(false).build().unwrap();
    let second = Logger::builder(&second_path).background(false).build().unwrap();

    log_info!(first, "goes to the first sink");
    log_info!(second, "goes to the second sink");

    first.drain_once();
    second.drain_once();

    let first_lines = read_lines(&first_path);
    let second_lines = read_lines(&second_path);
    assert_eq!(first_lines.len(), 1);
    assert_eq!(second_lines.len(), 1);
    assert!(first_lines[0].ends_with("goes to the first sink"));
    assert!(second_lines[0].ends_with("goes to the second sink"));
}

#[test]
fn test_sync_logger_without_drain_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nodrain.log");
    let logger = Logger::builder(&path).background(false).build().unwrap();

    log_info!(logger, "queued only");

    assert_eq!(read_lines(&path).len(), 0, "without a drain pass nothing reaches the sink");
    logger.drain_once();
    assert_eq!(read_lines(&path).len(), 1);
}

#[test]
fn test_background_drainer_picks_up_messages() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("background.log");
    let logger = Logger::builder(&path)
        .drain_interval(Duration::from_millis(1))
        .build()
        .unwrap();

    log_info!(logger, "drained in the background");

    // Without any explicit drain call the line shows up shortly.
    let mut waited = Duration::ZERO;
    while read_lines(&path).is_empty() && waited < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(10));
        waited += Duration::from_millis(10);
    }
    let lines = read_lines(&path);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("drained in the background"));
}
