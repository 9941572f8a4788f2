use chrono::{DateTime, Duration, TimeZone, Utc};

use course_sentinel::messaging::AdminReply;
use course_sentinel::session::captcha::accepts_reply;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
}

fn reply(update_id: i64, chat_id: &str, text: Option<&str>, age_secs: i64) -> AdminReply {
    AdminReply {
        update_id,
        chat_id: chat_id.to_owned(),
        text: text.map(str::to_owned),
        date: now() - Duration::seconds(age_secs),
    }
}

const WINDOW: i64 = 30;

#[test]
fn fresh_admin_reply_is_accepted_and_trimmed() {
    let code = accepts_reply(
        &reply(10, "42", Some("  7F3K \n"), 5),
        "42",
        now(),
        Duration::seconds(WINDOW),
        None,
    );
    assert_eq!(code.as_deref(), Some("7F3K"));
}

#[test]
fn reply_from_another_chat_is_ignored() {
    let code = accepts_reply(
        &reply(10, "99", Some("7F3K"), 5),
        "42",
        now(),
        Duration::seconds(WINDOW),
        None,
    );
    assert!(code.is_none());
}

#[test]
fn stale_reply_is_ignored() {
    let code = accepts_reply(
        &reply(10, "42", Some("7F3K"), WINDOW),
        "42",
        now(),
        Duration::seconds(WINDOW),
        None,
    );
    assert!(code.is_none());
}

#[test]
fn already_consumed_update_is_ignored() {
    let window = Duration::seconds(WINDOW);
    assert!(accepts_reply(&reply(10, "42", Some("A"), 1), "42", now(), window, Some(10)).is_none());
    assert!(accepts_reply(&reply(9, "42", Some("A"), 1), "42", now(), window, Some(10)).is_none());
    assert!(accepts_reply(&reply(11, "42", Some("A"), 1), "42", now(), window, Some(10)).is_some());
}

#[test]
fn empty_or_missing_text_is_ignored() {
    let window = Duration::seconds(WINDOW);
    assert!(accepts_reply(&reply(10, "42", Some("   "), 1), "42", now(), window, None).is_none());
    assert!(accepts_reply(&reply(10, "42", None, 1), "42", now(), window, None).is_none());
}
