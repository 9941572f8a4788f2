use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use course_sentinel::deadline::DeadlineTracker;
use course_sentinel::models::course::{
    ActivityKind, AssignmentDetails, Attachment, CourseRecord, DateText, FileSentRecord,
    NotificationRecord,
};
use course_sentinel::monitor::pruner::prune_course;
use course_sentinel::monitor::reconciler::compute_delta;

const FRI_17: &str = "Friday، 17 January 2025، 11:59 PM";
const SUN_19: &str = "Sunday، 19 January 2025، 11:59 PM";
const FRI_10: &str = "Friday، 10 January 2025، 11:59 PM";
const SAT_11: &str = "Saturday، 11 January 2025، 11:59 PM";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 8, 0, 0).unwrap()
}

fn tracker() -> DeadlineTracker {
    DeadlineTracker::new(FixedOffset::east_opt(210 * 60).unwrap()).unwrap()
}

fn attachment(name: &str) -> Attachment {
    Attachment {
        url: format!("https://p/pluginfile.php/{name}"),
        file_name: name.to_owned(),
    }
}

fn assignment(deadline: &str, attachments: Vec<Attachment>) -> AssignmentDetails {
    AssignmentDetails {
        opened: Some(DateText::new("Monday، 6 January 2025، 8:00 AM")),
        deadline: Some(DateText::new(deadline)),
        closed: None,
        attachments,
        fetch_succeeded: true,
    }
}

#[test]
fn identical_details_produce_no_delta() {
    let details = assignment(FRI_17, vec![attachment("a.pdf")]);
    let delta = compute_delta(&ActivityKind::Assignment, &details, &details, &tracker(), now());
    assert!(!delta.is_reportable());
}

#[test]
fn deadline_extension_is_reported_with_both_values() {
    let old = assignment(FRI_17, Vec::new());
    let new = assignment(SUN_19, Vec::new());

    let delta = compute_delta(&ActivityKind::Assignment, &old, &new, &tracker(), now());

    let due = delta.due.as_ref().expect("due change");
    assert_eq!(due.old.as_ref().unwrap().days_remaining, Some(2));
    assert_eq!(due.new.as_ref().unwrap().days_remaining, Some(4));
    assert!(delta.opened.is_none());
    assert!(delta.is_reportable());
}

#[test]
fn change_between_two_passed_deadlines_is_suppressed() {
    let old = assignment(FRI_10, Vec::new());
    let new = assignment(SAT_11, Vec::new());
    let delta = compute_delta(&ActivityKind::Assignment, &old, &new, &tracker(), now());
    assert!(delta.due.is_none());
    assert!(!delta.is_reportable());
}

#[test]
fn passed_deadline_reopened_is_reported() {
    let old = assignment(FRI_10, Vec::new());
    let new = assignment(FRI_17, Vec::new());
    let delta = compute_delta(&ActivityKind::Assignment, &old, &new, &tracker(), now());
    assert!(delta.due.is_some());
}

#[test]
fn added_and_removed_attachments_are_sorted_by_url() {
    let old = assignment(FRI_17, vec![attachment("b.pdf"), attachment("a.pdf")]);
    let new = assignment(
        FRI_17,
        vec![attachment("d.pdf"), attachment("b.pdf"), attachment("c.pdf")],
    );

    let delta = compute_delta(&ActivityKind::Assignment, &old, &new, &tracker(), now());

    let added: Vec<&str> = delta.added.iter().map(|a| a.file_name.as_str()).collect();
    let removed: Vec<&str> = delta.removed.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(added, ["c.pdf", "d.pdf"]);
    assert_eq!(removed, ["a.pdf"]);
}

#[test]
fn losing_every_attachment_is_not_reported_as_removal() {
    let old = assignment(FRI_17, vec![attachment("a.pdf")]);
    let new = assignment(FRI_17, Vec::new());
    let delta = compute_delta(&ActivityKind::Assignment, &old, &new, &tracker(), now());
    assert!(delta.removed.is_empty());
    assert!(!delta.is_reportable());
}

#[test]
fn quiz_attachments_are_ignored() {
    let mut old = assignment(FRI_17, Vec::new());
    old.deadline = None;
    old.closed = Some(DateText::new(FRI_17));
    let mut new = old.clone();
    new.attachments.push(attachment("a.pdf"));

    let delta = compute_delta(&ActivityKind::Quiz, &old, &new, &tracker(), now());
    assert!(delta.added.is_empty());
}

#[test]
fn unknown_to_known_date_counts_as_change() {
    let mut old = assignment(FRI_17, Vec::new());
    old.deadline = Some(DateText::unknown());
    let new = assignment(FRI_17, Vec::new());

    let delta = compute_delta(&ActivityKind::Assignment, &old, &new, &tracker(), now());
    let due = delta.due.expect("due change");
    assert_eq!(due.old.unwrap().instant, None);
}

fn sent_file(name: &str) -> FileSentRecord {
    FileSentRecord {
        sent: true,
        file_name: name.to_owned(),
        local_path: None,
        sha256: None,
        sent_at: now(),
    }
}

#[test]
fn prune_drops_expired_assignments_and_their_records() {
    let mut course = CourseRecord::new("101", "https://p/course/view.php?id=101");
    course.assignments.insert(
        "https://p/assign?id=1".into(),
        assignment(FRI_10, vec![attachment("old.pdf")]),
    );
    course.assignments.insert(
        "https://p/assign?id=2".into(),
        assignment(FRI_17, vec![attachment("live.pdf")]),
    );
    let mut unknown = assignment(FRI_17, Vec::new());
    unknown.deadline = Some(DateText::unknown());
    course.assignments.insert("https://p/assign?id=3".into(), unknown);

    for url in ["https://p/assign?id=1", "https://p/assign?id=2"] {
        course.sent_notifications.insert(
            url.into(),
            NotificationRecord {
                sent: true,
                sent_at: now(),
                activity_name: "HW".into(),
            },
        );
    }
    course
        .sent_files
        .insert(attachment("old.pdf").url, sent_file("old.pdf"));
    course
        .sent_files
        .insert(attachment("live.pdf").url, sent_file("live.pdf"));

    let report = prune_course(&mut course, &tracker(), now());

    assert_eq!(report.assignments, 1);
    assert_eq!(report.notifications, 1);
    assert_eq!(report.files, 1);
    assert!(!course.assignments.contains_key("https://p/assign?id=1"));
    assert!(course.assignments.contains_key("https://p/assign?id=3"), "unknown dates survive");
    assert!(course.sent_notifications.contains_key("https://p/assign?id=2"));
    assert!(course.sent_files.contains_key(&attachment("live.pdf").url));
}

#[test]
fn prune_of_current_state_is_a_no_op() {
    let mut course = CourseRecord::new("101", "https://p/course/view.php?id=101");
    course
        .assignments
        .insert("https://p/assign?id=2".into(), assignment(FRI_17, Vec::new()));
    let report = prune_course(&mut course, &tracker(), now());
    assert!(report.is_empty());
}
