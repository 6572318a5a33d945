//! Recognised column labels per logical field, in lookup order.
//!
//! Labels are matched on trimmed text ignoring ASCII case; the first alias
//! with a non-empty cell wins.

pub const TO: &[&str] = &[
    "to",
    "email",
    "e-mail",
    "email address",
    "recipient",
    "邮箱",
    "收件人",
    "收件人邮箱",
    "邮件地址",
];

pub const NAME: &[&str] = &["name", "姓名", "名字", "称呼"];

pub const SUBJECT: &[&str] = &["subject", "主题", "邮件主题", "标题"];

pub const BODY: &[&str] = &["body", "content", "html", "正文", "内容", "邮件内容"];

pub const SEGMENT: &[&str] = &["segment", "audience", "group", "分组", "人群", "受众"];

pub const PHASE: &[&str] = &["phase", "stage", "阶段", "轮次"];

pub const WEEKDAY: &[&str] = &["weekday", "day", "星期"];

pub const SEND_DATE: &[&str] = &["sendDate", "send_date", "date", "发送日期", "日期"];

pub const SEND_TIME: &[&str] = &["sendTime", "send_time", "time", "发送时间", "时间"];

pub const DELAY_HOURS: &[&str] = &["delayHours", "delay_hours", "delay", "延迟", "延迟小时"];

pub const SENT_MARKER: &[&str] = &["status", "sent", "已发送", "发送状态", "状态"];

/// Sent-marker values meaning "already delivered, skip this row".
pub const SENT_TOKENS: &[&str] = &[
    "sent", "yes", "y", "true", "1", "✓", "✔", "done", "completed", "已发送", "发送成功",
];

/// Canonical header for each field, in template column order.
pub const CANONICAL_COLUMNS: &[&str] = &[
    "to",
    "name",
    "subject",
    "body",
    "segment",
    "phase",
    "weekday",
    "sendDate",
    "sendTime",
    "delayHours",
    "status",
];
