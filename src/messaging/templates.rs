//! Persian HTML message bodies.

use std::fmt::Write as _;

use crate::deadline::{DeadlineInfo, Urgency};
use crate::models::course::{ActivityKind, Attachment};
use crate::monitor::overview::{DeadlineEvent, EventKind};
use crate::monitor::reconciler::UpdateDelta;

const RULE: &str = "━━━━━━━━━━━━━━━━━";

/// Escape text for Telegram's HTML parse mode.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn noun(kind: &ActivityKind) -> &'static str {
    if matches!(kind, ActivityKind::Quiz) {
        "آزمون"
    } else {
        "تکلیف"
    }
}

fn due_label(kind: &ActivityKind) -> &'static str {
    if matches!(kind, ActivityKind::Quiz) {
        "بسته می‌شود"
    } else {
        "مهلت"
    }
}

/// Label of the link button under a notice.
#[must_use]
pub fn view_button(kind: &ActivityKind) -> String {
    format!("🔗 مشاهده {}", noun(kind))
}

/// Label of the link button under an update notice.
#[must_use]
pub fn view_update_button(kind: &ActivityKind) -> String {
    if matches!(kind, ActivityKind::Quiz) {
        view_button(kind)
    } else {
        "🔗 مشاهده تمرین".to_owned()
    }
}

/// Remaining-days line under a due date.
fn status_line(days: Option<i64>, quiz: bool) -> Option<String> {
    let line = match Urgency::from_days(days) {
        Urgency::Unknown => return None,
        Urgency::Passed => format!(
            "❌ <b>مهلت گذشته است!</b> ({} روز پیش)",
            days.unwrap_or_default().abs()
        ),
        Urgency::DueToday if quiz => "🔴 <b>امروز آخرین فرصت است!</b>".to_owned(),
        Urgency::DueToday => "🔴 <b>امروز آخرین مهلت است!</b>".to_owned(),
        Urgency::OneDayLeft => "⚠️ <b>فقط 1 روز باقی مانده</b>".to_owned(),
        Urgency::Urgent => format!("⚠️ {} روز دیگر", days.unwrap_or_default()),
        Urgency::Soon | Urgency::Comfortable => {
            format!("✅ {} روز دیگر", days.unwrap_or_default())
        }
    };
    Some(line)
}

fn activity_header(title: &str, course: &str, section: &str, kind: &ActivityKind, name: &str) -> String {
    format!(
        "{title}\n\n🎓 درس: {}\n📍 بخش: {}\n\n{} {}\n\n",
        escape_html(course),
        escape_html(section),
        kind.emoji(),
        escape_html(name)
    )
}

/// Facts about a newly seen deadline-bearing activity.
#[derive(Debug, Clone)]
pub struct NewActivityNotice<'a> {
    /// Activity type.
    pub kind: &'a ActivityKind,
    /// Course title.
    pub course: &'a str,
    /// Section heading.
    pub section: &'a str,
    /// Activity name.
    pub name: &'a str,
    /// Parsed opening date, when known.
    pub opened: Option<&'a DeadlineInfo>,
    /// Parsed deadline or closing time, when known.
    pub due: Option<&'a DeadlineInfo>,
    /// Attachments to list.
    pub attachments: &'a [Attachment],
}

/// Notice for a new assignment or quiz.
///
/// A deadline that is due today switches an assignment notice to the
/// reminder wording and omits attachments.
#[must_use]
pub fn new_activity(notice: &NewActivityNotice<'_>) -> String {
    let quiz = matches!(notice.kind, ActivityKind::Quiz);
    let last_day = !quiz && notice.due.is_some_and(|due| due.days_remaining == Some(0));
    let title = if last_day {
        "⏰ <b>یادآوری تکلیف</b>".to_owned()
    } else {
        format!("🆕 <b>{} جدید</b>", noun(notice.kind))
    };

    let mut msg = activity_header(&title, notice.course, notice.section, notice.kind, notice.name);

    if let Some(opened) = notice.opened {
        let _ = writeln!(msg, "📅 باز شده: {}", opened.display);
    }
    if let Some(due) = notice.due {
        let _ = writeln!(msg, "⏰ {}: {}", due_label(notice.kind), due.display);
        if let Some(line) = status_line(due.days_remaining, quiz) {
            let _ = writeln!(msg, "{line}");
        }
    }

    if !last_day && !notice.attachments.is_empty() {
        msg.push_str("\n📎 <b>فایل‌های ضمیمه:</b>\n");
        for att in notice.attachments {
            let _ = writeln!(msg, "📄 {}", escape_html(&att.file_name));
        }
    }

    msg
}

/// Notice for a new activity whose details could not be read.
#[must_use]
pub fn reduced_new_activity(kind: &ActivityKind, course: &str, section: &str, name: &str) -> String {
    let title = format!("🆕 <b>{} جدید</b>", noun(kind));
    activity_header(&title, course, section, kind, name)
}

/// Notice for changed dates or attachments of a known activity.
#[must_use]
pub fn activity_update(kind: &ActivityKind, course: &str, name: &str, delta: &UpdateDelta) -> String {
    let quiz = matches!(kind, ActivityKind::Quiz);
    let dates_changed = delta.opened.is_some() || delta.due.is_some();
    let title = match (dates_changed, quiz) {
        (true, true) => "🔄 <b>تغییر در تاریخ آزمون</b>",
        (true, false) => "🔄 <b>تغییر در تاریخ تمرین</b>",
        (false, _) => "🔄 <b>تغییر در فایل‌های تمرین</b>",
    };

    let mut msg = format!(
        "{title}\n\n📚 درس: {}\n{} {}\n\n",
        escape_html(course),
        kind.emoji(),
        escape_html(name)
    );

    if let Some(opened) = &delta.opened {
        msg.push_str("📅 تاریخ باز شدن:\n");
        if let Some(old) = &opened.old {
            let _ = writeln!(msg, " قبلی: {}", old.display);
        }
        if let Some(new) = &opened.new {
            let _ = writeln!(msg, " جدید: {}", new.display);
        }
        msg.push('\n');
    }

    if let Some(due) = &delta.due {
        let heading = if quiz { "⏰ بسته می‌شود:" } else { "⏰ مهلت تحویل:" };
        let _ = writeln!(msg, "{heading}");
        if let Some(old) = &due.old {
            let _ = writeln!(msg, " قبلی: {}", old.display);
        }
        if let Some(new) = &due.new {
            let _ = writeln!(msg, " جدید: {}", new.display);
            if let Some(line) = status_line(new.days_remaining, false) {
                let _ = writeln!(msg, " {line}");
            }
        }
    }

    if !delta.added.is_empty() {
        msg.push_str("\n➕ <b>فایل‌های جدید اضافه شده:</b>\n");
        for att in &delta.added {
            let _ = writeln!(msg, " 📄 {}", escape_html(&att.file_name));
        }
    }

    if !delta.removed.is_empty() {
        msg.push_str("\n➖ <b>فایل‌های حذف شده:</b>\n");
        for att in &delta.removed {
            let _ = writeln!(msg, " 📄 {}", escape_html(&att.file_name));
        }
    }

    msg
}

/// Last-day reminder with hour and minute granularity.
#[must_use]
pub fn last_day_reminder(
    kind: &ActivityKind,
    course: &str,
    section: &str,
    name: &str,
    due: &DeadlineInfo,
    remaining: chrono::Duration,
) -> String {
    let title = format!("⏰ <b>یادآوری: مهلت {} رو به پایان است!</b>", noun(kind));
    let mut msg = activity_header(&title, course, section, kind, name);
    let _ = writeln!(msg, "⏰ {}: {}", due_label(kind), due.display);

    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() - hours * 60;
    if hours == 0 {
        let _ = write!(msg, "🔴 <b>فقط {minutes} دقیقه دیگر!</b>");
    } else {
        let _ = write!(msg, "🔴 <b>فقط {hours} ساعت و {minutes} دقیقه دیگر!</b>");
    }
    msg
}

/// One activity line in a course overview.
#[derive(Debug, Clone)]
pub struct OverviewEntry<'a> {
    /// Activity type.
    pub kind: &'a ActivityKind,
    /// Activity name.
    pub name: &'a str,
    /// Activity URL.
    pub url: &'a str,
}

/// Course overview listing every visible activity by section.
#[must_use]
pub fn course_overview(
    course: &str,
    course_url: &str,
    sections: &[(&str, Vec<OverviewEntry<'_>>)],
    stamp: &str,
) -> String {
    let mut msg = format!(
        "🎓 <b>{}</b>\n🔗 <a href=\"{}\">لینک درس</a>\n\n",
        escape_html(course),
        escape_html(course_url)
    );

    let mut any = false;
    for (section, entries) in sections {
        if entries.is_empty() {
            continue;
        }
        any = true;
        let _ = writeln!(msg, "📍 <b>{}</b>", escape_html(section));
        for entry in entries {
            let _ = writeln!(
                msg,
                " {} <a href=\"{}\">{}</a>",
                entry.kind.emoji(),
                escape_html(entry.url),
                escape_html(entry.name)
            );
        }
        msg.push('\n');
    }

    if !any {
        msg.push_str("📭 هنوز محتوایی اضافه نشده است.\n");
    }

    let _ = write!(msg, "{RULE}\n🕐 {stamp}");
    msg
}

fn overview_status(days: Option<i64>) -> String {
    match Urgency::from_days(days) {
        Urgency::Unknown => "ℹ️ زمان نامشخص".to_owned(),
        Urgency::Passed => "❌ <b>گذشته</b>".to_owned(),
        Urgency::DueToday => "🔴 <b>امروز</b>".to_owned(),
        Urgency::OneDayLeft => "⚠️ <b>1 روز باقی مانده</b>".to_owned(),
        Urgency::Urgent => format!("⚠️ {} روز دیگر", days.unwrap_or_default()),
        Urgency::Soon => format!("🟡 {} روز دیگر", days.unwrap_or_default()),
        Urgency::Comfortable => format!("✅ {} روز دیگر", days.unwrap_or_default()),
    }
}

/// Cross-course list of upcoming openings and deadlines.
///
/// `events` must already be sorted; grouping keeps the first-seen course
/// order.
#[must_use]
pub fn deadline_overview(events: &[DeadlineEvent], stamp: &str) -> String {
    let mut msg = String::from("📃 <b>لیست رویداد ها</b>\n\n");

    if events.is_empty() {
        msg.push_str("✅ هیچ تکلیف یا آزمون فعالی وجود ندارد!\n\n");
    } else {
        let mut courses: Vec<&str> = Vec::new();
        for event in events {
            if !courses.contains(&event.course_name.as_str()) {
                courses.push(&event.course_name);
            }
        }

        for course in courses {
            let _ = write!(msg, "📚 <b>{}</b>\n\n", escape_html(course));
            for event in events.iter().filter(|e| e.course_name == course) {
                let (emoji, label) = match (event.event, &event.kind) {
                    (EventKind::Opened, _) => ("🔓", "باز شدن"),
                    (EventKind::Due, ActivityKind::Quiz) => ("❓", "بسته می‌شود"),
                    (EventKind::Due, _) => ("📝", "مهلت"),
                };
                let _ = writeln!(msg, "{emoji} <b>{}</b>", escape_html(&event.activity_name));
                let _ = writeln!(msg, "{label}: {}", event.info.display);
                let _ = write!(msg, "{}\n\n", overview_status(event.info.days_remaining));
            }
            let _ = write!(msg, "{RULE}\n\n");
        }
    }

    let _ = write!(msg, "🕐 آخرین به‌روزرسانی: {stamp}");
    msg
}

/// Caption of the captcha image sent to the admin.
#[must_use]
pub fn captcha_prompt(correlation_id: &str) -> String {
    format!("🔒 لطفا کد امنیتی را وارد کنید:\n🆔 {correlation_id}")
}

/// Acknowledgement sent once the captcha code arrives.
#[must_use]
pub fn captcha_ack() -> String {
    "✅ کد دریافت شد, در حال ورود...".to_owned()
}

/// Admin alert for a failed cycle.
#[must_use]
pub fn cycle_failure(error: &str) -> String {
    format!(
        "🚨 <b>خرابی در چرخه بررسی دوره‌ها</b>\n\n{}",
        escape_html(error)
    )
}

/// Caption of a delivered attachment.
#[must_use]
pub fn file_caption(file_name: &str) -> String {
    format!("📎 {file_name}")
}

/// Link-only notice for an attachment above the upload ceiling.
#[must_use]
pub fn file_too_large(file_name: &str, url: &str, size_bytes: u64) -> String {
    format!(
        "📎 فایل خیلی بزرگ است ({} MB)\n{}\n🔗 {}",
        format_megabytes(size_bytes),
        escape_html(file_name),
        escape_html(url)
    )
}

/// Fallback notice when an attachment could not be delivered.
#[must_use]
pub fn file_failed(file_name: &str, url: &str) -> String {
    format!(
        "⚠️ خطا در دانلود فایل\n📎 {}\n🔗 {}",
        escape_html(file_name),
        escape_html(url)
    )
}

fn format_megabytes(size_bytes: u64) -> String {
    let hundredths = size_bytes.saturating_mul(100) / (1024 * 1024);
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}
