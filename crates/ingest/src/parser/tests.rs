use chrono::{DateTime, Duration, TimeZone, Utc};

use mailcast_core::TaskStatus;
use mailcast_schedule::Zone;

use super::*;
use crate::tabular::CellValue;

fn source() -> Zone {
    "-08:00".parse().unwrap()
}

fn target() -> Zone {
    "+08:00".parse().unwrap()
}

/// 14:00 on 2025-06-01 in the source zone.
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 22, 0, 0).unwrap()
}

fn row(to: &str) -> Row {
    Row::new()
        .with("to", to)
        .with("subject", "Welcome")
        .with("body", "<p>Hello</p>")
}

fn parse(rows: &[Row]) -> Result<ParsedBatch, IngestError> {
    parse_rows(rows, &source(), &target(), now())
}

#[test]
fn upload_of_three_rows() {
    let rows = vec![
        row("past@mail.io").with("sendDate", "2025-01-01").with("sendTime", "09:00"),
        row("later@mail.io").with("sendDate", "2025-06-03").with("sendTime", "14:00"),
        Row::new().with("subject", "No recipient").with("body", "x"),
    ];

    let batch = parse(&rows).unwrap();
    assert_eq!(batch.tasks.len(), 2);
    assert_eq!(batch.skipped, 0);
    assert_eq!(
        batch.rejected,
        vec![RowError {
            row: 4,
            message: "missing required field(s): to".into()
        }]
    );

    let past = &batch.tasks[0];
    assert_eq!(past.delay_hours, 0.0);
    assert_eq!(past.scheduled_for, now());
    assert_eq!(past.status, TaskStatus::Pending);
    assert_eq!(past.send_date, "2025-01-01");

    let later = &batch.tasks[1];
    assert_eq!(later.delay_hours, 48.0);
    assert_eq!(later.scheduled_for, now() + Duration::hours(48));
    assert_eq!(later.display_time, "2025-06-04 06:00");
    assert_eq!(later.status, TaskStatus::Pending);
}

#[test]
fn sent_markers_are_skipped_not_rejected() {
    let markers: Vec<CellValue> = vec![
        "sent".into(),
        "YES".into(),
        "y".into(),
        "True".into(),
        "1".into(),
        "done".into(),
        "Completed".into(),
        "已发送".into(),
        "发送成功".into(),
        "✓".into(),
        "✔".into(),
        true.into(),
        1.0.into(),
    ];
    let count = markers.len();
    let mut rows: Vec<Row> = markers
        .into_iter()
        .map(|m| row("skip@mail.io").with("status", m))
        .collect();
    rows.push(row("keep@mail.io").with("status", "pending"));

    let batch = parse(&rows).unwrap();
    assert_eq!(batch.skipped, count);
    assert!(batch.rejected.is_empty());
    assert_eq!(batch.tasks.len(), 1);
    assert_eq!(batch.tasks[0].to, "keep@mail.io");
}

#[test]
fn all_rows_sent_is_an_error() {
    let err = parse(&[row("a@mail.io").with("sent", "yes")]).unwrap_err();
    assert!(matches!(err, IngestError::NoValidRows(msg) if msg.contains("already marked as sent")));
}

#[test]
fn zero_survivors_joins_row_messages() {
    let rows = vec![
        row("not-an-address"),
        Row::new().with("to", "a@mail.io"),
    ];
    let err = parse(&rows).unwrap_err();
    let IngestError::NoValidRows(msg) = err else {
        panic!("expected NoValidRows, got {err:?}");
    };
    assert_eq!(
        msg,
        "Row 2: invalid email address: not-an-address; Row 3: missing required field(s): subject, body"
    );
}

#[test]
fn partial_success_is_not_an_error() {
    let batch = parse(&[row("ok@mail.io"), row("bad@nodot")]).unwrap();
    assert_eq!(batch.tasks.len(), 1);
    assert_eq!(batch.rejected.len(), 1);
    assert_eq!(batch.rejected[0].row, 3);
}

#[test]
fn localized_headers_are_recognised() {
    let rows = vec![Row::new()
        .with("收件人邮箱", " li@mail.cn ")
        .with("姓名", "李雷")
        .with("邮件主题", "你好")
        .with("正文", "内容")
        .with("分组", "vip")
        .with("阶段", "2")
        .with("星期", "周三")
        .with("发送日期", "2025/06/03")
        .with("发送时间", "2:00 PM")];

    let batch = parse(&rows).unwrap();
    let task = &batch.tasks[0];
    assert_eq!(task.to, "li@mail.cn");
    assert_eq!(task.name, "李雷");
    assert_eq!(task.subject, "你好");
    assert_eq!(task.segment, "vip");
    assert_eq!(task.phase, "2");
    assert_eq!(task.weekday, "周三");
    assert_eq!(task.delay_hours, 48.0);
}

#[test]
fn header_match_ignores_case_and_padding() {
    let rows = vec![Row::new()
        .with(" Email ", "a@mail.io")
        .with("SUBJECT", "s")
        .with("Content", "b")];
    assert_eq!(parse(&rows).unwrap().tasks[0].to, "a@mail.io");
}

#[test]
fn first_non_empty_alias_wins() {
    let rows = vec![row("")
        .with("email", "")
        .with("recipient", "fallback@mail.io")];
    assert_eq!(parse(&rows).unwrap().tasks[0].to, "fallback@mail.io");
}

#[test]
fn optional_fields_default_to_empty() {
    let task = &parse(&[row("a@mail.io")]).unwrap().tasks[0];
    assert_eq!(task.name, "");
    assert_eq!(task.segment, "");
    assert_eq!(task.phase, "");
    assert_eq!(task.weekday, "");
    assert_eq!(task.scheduled_for, now());
}

#[test]
fn numeric_cells_are_read_as_serials() {
    // 45811 = 2025-06-03, 0.5 = noon
    let rows = vec![row("a@mail.io").with("date", 45811.0).with("time", 0.5)];
    let task = &parse(&rows).unwrap().tasks[0];
    assert_eq!(task.scheduled_for, Utc.with_ymd_and_hms(2025, 6, 3, 20, 0, 0).unwrap());
    assert_eq!(task.delay_hours, 46.0);
}

#[test]
fn delay_column_applies_without_a_date() {
    let rows = vec![
        row("a@mail.io").with("delayHours", "1.5"),
        row("b@mail.io").with("delay", "-3"),
        row("c@mail.io").with("delay", "soon"),
    ];
    let batch = parse(&rows).unwrap();
    assert_eq!(batch.tasks[0].scheduled_for, now() + Duration::minutes(90));
    assert_eq!(batch.tasks[0].delay_hours, 1.5);
    assert_eq!(batch.tasks[1].scheduled_for, now());
    assert_eq!(batch.tasks[2].scheduled_for, now());
}

#[test]
fn huge_delay_rejects_only_that_row() {
    let rows = vec![
        row("a@mail.io").with("delayHours", "1e15"),
        row("b@mail.io").with("delayHours", "2"),
    ];
    let batch = parse(&rows).unwrap();
    assert_eq!(batch.tasks.len(), 1);
    assert_eq!(batch.tasks[0].to, "b@mail.io");
    assert_eq!(
        batch.rejected,
        vec![RowError {
            row: 2,
            message: "delay out of range: 1e15".into()
        }]
    );
}

#[test]
fn huge_delay_alone_is_an_error() {
    let err = parse(&[row("a@mail.io").with("delay", 1e300)]).unwrap_err();
    assert!(err.to_string().contains("delay out of range"), "got: {err}");
}

#[test]
fn date_wins_over_delay() {
    let rows = vec![row("a@mail.io")
        .with("sendDate", "2025-06-03")
        .with("sendTime", "14:00")
        .with("delayHours", "1")];
    assert_eq!(parse(&rows).unwrap().tasks[0].delay_hours, 48.0);
}

#[test]
fn parsing_is_pure() {
    let rows = vec![row("a@mail.io").with("sendDate", "6/3/2025").with("sendTime", "09:30")];
    let first = parse(&rows).unwrap().tasks;
    let second = parse(&rows).unwrap().tasks;
    assert_eq!(first, second);
}

#[test]
fn empty_sheet_is_an_error() {
    assert!(matches!(parse(&[]), Err(IngestError::NoValidRows(_))));
}
