//! End-to-end cycles against scripted portal pages.

use chrono::{Duration, TimeZone, Utc};
use course_sentinel::models::course::ActivityKind;
use course_sentinel::models::reminder::ReminderLedger;
use course_sentinel::persistence::db;
use course_sentinel::persistence::document_repo::DocumentRepo;

use super::test_helpers::{
    activity, assignment_details, attachment, harness, harness_with, pdf_bytes, quiz_details,
    snapshot, COURSE_101, COURSE_202, FRI_10, FRI_17, WED_15,
};

const QUIZ_URL: &str = "https://vu.example.ac.ir/mod/quiz/view.php?id=11";
const HW_URL: &str = "https://vu.example.ac.ir/mod/assign/view.php?id=21";
const SLIDES_URL: &str = "https://vu.example.ac.ir/mod/resource/view.php?id=31";

#[tokio::test]
async fn new_quiz_closing_in_two_days_is_announced_once() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![(
                "Week 1",
                vec![
                    activity("Quiz 1", ActivityKind::Quiz, QUIZ_URL),
                    activity("Slides", ActivityKind::Resource, SLIDES_URL),
                ],
            )],
        ),
    );
    h.extractor.set_details(QUIZ_URL, quiz_details(FRI_17));

    let report = h.monitor.run_cycle().await.expect("cycle");

    assert_eq!(report.checked, 1);
    assert_eq!(report.new_notices, 1);
    assert_eq!(report.reminders, 0);
    assert_eq!(h.gateway.count_containing("🆕 <b>آزمون جدید</b>"), 1);
    assert_eq!(h.gateway.count_containing("🆕 <b>تکلیف جدید</b>"), 0, "resources are not announced");

    let notice = h
        .gateway
        .messages()
        .into_iter()
        .find(|m| m.text.contains("آزمون جدید"))
        .unwrap();
    assert!(notice.text.contains("جمعه، 28 دی 1403 - ساعت 23:59"));
    assert!(notice.text.contains("⚠️ 2 روز دیگر"));
    assert_eq!(notice.link_button.unwrap().url, QUIZ_URL);

    let course = &h.monitor.state().courses["101"];
    assert_eq!(course.name, "Algorithms");
    assert!(course.sent_notifications.contains_key(QUIZ_URL));
    assert!(course.assignments.contains_key(QUIZ_URL));
    assert!(h.monitor.state().reminders.is_empty());
    assert!(h.monitor.state().last_day_reminders.is_empty());
}

#[tokio::test]
async fn overviews_are_sent_once_then_edited() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 1", vec![activity("Quiz 1", ActivityKind::Quiz, QUIZ_URL)])],
        ),
    );
    h.extractor.set_details(QUIZ_URL, quiz_details(FRI_17));

    h.monitor.run_cycle().await.expect("first cycle");
    assert_eq!(h.gateway.count_containing("🎓 <b>Algorithms</b>"), 1);
    assert_eq!(h.gateway.count_containing("📃 <b>لیست رویداد ها</b>"), 1);
    let overview = h.gateway.count_containing("❓ <b>Quiz 1</b>\nبسته می‌شود:");
    assert_eq!(overview, 1);
    let course_handle = h.monitor.state().messages.get("101").cloned().unwrap();
    assert!(h.monitor.state().deadline_message.is_some());

    h.gateway.clear();
    h.monitor.run_cycle().await.expect("second cycle");

    assert!(h.gateway.messages().is_empty());
    let edits = h.gateway.edits();
    assert_eq!(edits.len(), 2);
    assert_eq!(edits[0].0, course_handle);
    assert!(edits[0].1.contains("🕐 1403/10/26, 11:30:00"));
}

#[tokio::test]
async fn vanished_overview_is_sent_again() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor
        .set_snapshot(COURSE_101, snapshot("Algorithms", vec![("Week 1", Vec::new())]));

    h.monitor.run_cycle().await.expect("first cycle");
    let before = h.monitor.state().messages.get("101").cloned().unwrap();

    h.gateway.vanish_edits();
    h.gateway.clear();
    h.monitor.run_cycle().await.expect("second cycle");

    let after = h.monitor.state().messages.get("101").cloned().unwrap();
    assert_ne!(before.message_id, after.message_id);
    assert_eq!(h.gateway.count_containing("📭 هنوز محتوایی اضافه نشده است."), 1);
}

#[tokio::test]
async fn added_attachment_is_reported_and_delivered_once() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, Vec::new()));
    h.monitor.run_cycle().await.expect("first cycle");
    assert_eq!(h.gateway.count_containing("🆕 <b>تکلیف جدید</b>"), 1);

    let file = attachment("spec.pdf");
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, vec![file.clone()]));
    h.fetcher.serve(&file.url, pdf_bytes(2048), "application/pdf");
    h.gateway.clear();

    let report = h.monitor.run_cycle().await.expect("second cycle");

    assert_eq!(report.update_notices, 1);
    assert_eq!(h.gateway.count_containing("🔄 <b>تغییر در فایل‌های تمرین</b>"), 1);
    assert_eq!(h.gateway.count_containing("📄 spec.pdf"), 1);
    let documents = h.gateway.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].1, "spec.pdf");
    assert!(documents[0].0.ends_with("101/spec.pdf"));
    assert!(documents[0].0.exists());

    let record = &h.monitor.state().courses["101"].sent_files[&file.url];
    assert!(record.sent);
    assert_eq!(record.sha256.as_deref().map(str::len), Some(64));

    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("third cycle");
    assert_eq!(report.update_notices, 0);
    assert!(h.gateway.messages().is_empty());
    assert!(h.gateway.documents().is_empty());
    assert_eq!(h.fetcher.fetches(), 1);
}

#[tokio::test]
async fn new_assignment_attachments_are_delivered() {
    let mut h = harness(&[COURSE_101]).await;
    let files = vec![attachment("a.pdf"), attachment("b.pdf")];
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, files.clone()));
    for file in &files {
        h.fetcher.serve(&file.url, pdf_bytes(512), "application/pdf");
    }

    h.monitor.run_cycle().await.expect("cycle");

    assert_eq!(h.gateway.documents().len(), 2);
    assert_eq!(h.monitor.state().courses["101"].sent_files.len(), 2);
}

#[tokio::test]
async fn oversized_attachment_gets_a_link_instead() {
    let mut h = harness(&[COURSE_101]).await;
    let file = attachment("dataset.zip");
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, vec![file.clone()]));
    h.fetcher.serve(&file.url, pdf_bytes(8192), "application/zip");

    h.monitor.run_cycle().await.expect("cycle");

    assert!(h.gateway.documents().is_empty());
    assert_eq!(h.gateway.count_containing("فایل خیلی بزرگ است"), 1);
    let record = &h.monitor.state().courses["101"].sent_files[&file.url];
    assert!(record.local_path.is_none());
}

#[tokio::test]
async fn html_download_sends_fallback_and_records_nothing() {
    let mut h = harness(&[COURSE_101]).await;
    let file = attachment("spec.pdf");
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, vec![file.clone()]));
    h.fetcher
        .serve(&file.url, b"<html>login</html>".repeat(20), "text/html");

    let report = h.monitor.run_cycle().await.expect("cycle");

    assert_eq!(report.new_notices, 1);
    assert_eq!(h.gateway.count_containing("⚠️ خطا در دانلود فایل"), 1);
    assert!(h.monitor.state().courses["101"].sent_files.is_empty());
}

#[tokio::test]
async fn assignment_already_past_is_stored_silently_then_pruned() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 0", vec![activity("HW0", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_10, Vec::new()));

    let report = h.monitor.run_cycle().await.expect("cycle");

    assert_eq!(report.new_notices, 0);
    assert_eq!(h.gateway.count_containing("جدید"), 0);
    let course = &h.monitor.state().courses["101"];
    assert!(course.assignments.is_empty(), "expired details are pruned");
    assert!(course.sent_notifications.is_empty());
    assert_eq!(course.sections[0].activities.len(), 1);
    assert_eq!(h.gateway.count_containing("هیچ تکلیف یا آزمون فعالی وجود ندارد"), 1);

    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("second cycle");
    assert_eq!(report.new_notices + report.update_notices, 0);
    assert!(h.gateway.messages().is_empty());
}

#[tokio::test]
async fn deadline_entering_last_day_window_triggers_one_reminder() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, Vec::new()));

    let report = h.monitor.run_cycle().await.expect("first cycle");
    assert_eq!(report.reminders, 0);

    // Friday 11:30 local; the deadline is 12h29m away.
    h.clock.set(Utc.with_ymd_and_hms(2025, 1, 17, 8, 0, 0).unwrap());
    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("second cycle");

    assert_eq!(report.reminders, 1);
    assert_eq!(report.update_notices, 0);
    assert_eq!(
        h.gateway.count_containing("⏰ <b>یادآوری: مهلت تکلیف رو به پایان است!</b>"),
        1
    );
    assert_eq!(h.gateway.count_containing("فقط 12 ساعت و 29 دقیقه دیگر"), 1);
    let state = h.monitor.state();
    assert!(state.reminders.contains(&ReminderLedger::key("101", HW_URL)));
    assert!(state
        .last_day_reminders
        .contains(&ReminderLedger::last_day_key("101", HW_URL)));

    h.clock.set(Utc.with_ymd_and_hms(2025, 1, 17, 12, 0, 0).unwrap());
    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("third cycle");
    assert_eq!(report.reminders, 0);
    assert_eq!(h.gateway.count_containing("یادآوری"), 0);
}

#[tokio::test]
async fn no_reminder_after_the_deadline_passed() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, Vec::new()));
    h.monitor.run_cycle().await.expect("first cycle");

    // Saturday: the deadline passed while nothing was running.
    h.clock.set(Utc.with_ymd_and_hms(2025, 1, 18, 8, 0, 0).unwrap());
    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("second cycle");

    assert_eq!(report.reminders, 0);
    assert_eq!(h.gateway.count_containing("یادآوری"), 0);
    let course = &h.monitor.state().courses["101"];
    assert!(course.assignments.is_empty());
    assert!(course.sent_notifications.is_empty());
}

#[tokio::test]
async fn assignment_due_today_gets_reminder_wording_and_last_day_ledger() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(WED_15, vec![attachment("a.pdf")]));

    let report = h.monitor.run_cycle().await.expect("cycle");

    assert_eq!(report.new_notices, 1);
    assert_eq!(report.reminders, 0);
    assert_eq!(h.gateway.count_containing("⏰ <b>یادآوری تکلیف</b>"), 1);
    assert!(h.gateway.documents().is_empty());
    assert_eq!(h.fetcher.fetches(), 0);
    let state = h.monitor.state();
    assert!(state
        .last_day_reminders
        .contains(&ReminderLedger::last_day_key("101", HW_URL)));
    assert!(!state.reminders.contains(&ReminderLedger::key("101", HW_URL)));
}

#[tokio::test]
async fn replaying_a_reconciled_snapshot_is_silent() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![
                ("Week 1", vec![activity("Quiz 1", ActivityKind::Quiz, QUIZ_URL)]),
                ("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)]),
            ],
        ),
    );
    h.extractor.set_details(QUIZ_URL, quiz_details(FRI_17));
    h.extractor
        .set_details(HW_URL, assignment_details(WED_15, Vec::new()));

    h.monitor.run_cycle().await.expect("first cycle");
    let state_after_first = h.monitor.state().clone();

    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("second cycle");

    assert_eq!(report.new_notices, 0);
    assert_eq!(report.update_notices, 0);
    assert_eq!(report.reminders, 0);
    assert!(h.gateway.messages().is_empty());
    let state = h.monitor.state();
    assert_eq!(state.reminders, state_after_first.reminders);
    assert_eq!(state.last_day_reminders, state_after_first.last_day_reminders);
    assert_eq!(
        state.courses["101"].sent_notifications,
        state_after_first.courses["101"].sent_notifications
    );
}

#[tokio::test]
async fn deadline_extension_sends_update_notice() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(WED_15, Vec::new()));
    h.monitor.run_cycle().await.expect("first cycle");

    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, Vec::new()));
    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("second cycle");

    assert_eq!(report.update_notices, 1);
    assert_eq!(h.gateway.count_containing("🔄 <b>تغییر در تاریخ تمرین</b>"), 1);
    assert_eq!(h.gateway.count_containing(" جدید: جمعه، 28 دی 1403 - ساعت 23:59"), 1);
    let stored = &h.monitor.state().courses["101"].assignments[HW_URL];
    assert_eq!(stored.deadline.as_ref().unwrap().as_str(), FRI_17);
}

#[tokio::test]
async fn failed_detail_fetch_sends_reduced_notice_and_backfills_later() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );

    let report = h.monitor.run_cycle().await.expect("first cycle");

    assert_eq!(report.new_notices, 1);
    let notice = h
        .gateway
        .messages()
        .into_iter()
        .find(|m| m.text.contains("تکلیف جدید"))
        .unwrap();
    assert!(!notice.text.contains("⏰"), "no dates in a reduced notice");
    let course = &h.monitor.state().courses["101"];
    assert!(course.sent_notifications.contains_key(HW_URL));
    assert!(!course.assignments[HW_URL].fetch_succeeded);

    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, Vec::new()));
    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("second cycle");

    assert_eq!(report.new_notices, 0);
    assert_eq!(report.update_notices, 0);
    assert_eq!(h.gateway.count_containing("تکلیف جدید"), 0);
    let stored = &h.monitor.state().courses["101"].assignments[HW_URL];
    assert!(stored.fetch_succeeded);
    assert_eq!(stored.deadline.as_ref().unwrap().as_str(), FRI_17);
}

#[tokio::test]
async fn failed_notice_is_not_recorded() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 1", vec![activity("Quiz 1", ActivityKind::Quiz, QUIZ_URL)])],
        ),
    );
    h.extractor.set_details(QUIZ_URL, quiz_details(FRI_17));
    h.gateway.fail_sends(true);

    let report = h.monitor.run_cycle().await.expect("cycle");

    assert_eq!(report.new_notices, 0);
    let course = &h.monitor.state().courses["101"];
    assert!(course.sent_notifications.is_empty());
    assert!(course.assignments.contains_key(QUIZ_URL));
}

#[tokio::test]
async fn extraction_failure_keeps_stored_state() {
    let mut h = harness(&[COURSE_101, COURSE_202]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 1", vec![activity("Quiz 1", ActivityKind::Quiz, QUIZ_URL)])],
        ),
    );
    h.extractor
        .set_snapshot(COURSE_202, snapshot("Networks", vec![("Week 1", Vec::new())]));
    h.extractor.set_details(QUIZ_URL, quiz_details(FRI_17));
    h.monitor.run_cycle().await.expect("first cycle");
    let sections = h.monitor.state().courses["101"].sections.clone();

    h.extractor.break_course(COURSE_101);
    h.gateway.clear();
    let report = h.monitor.run_cycle().await.expect("second cycle");

    assert_eq!(report.failed, 1);
    assert_eq!(report.checked, 1);
    assert_eq!(h.monitor.state().courses["101"].sections, sections);
    let republished = h
        .gateway
        .edits()
        .iter()
        .filter(|(_, text)| text.contains("🎓 <b>Algorithms</b>"))
        .count();
    assert_eq!(republished, 1);
}

#[tokio::test]
async fn browser_crash_recovers_before_next_course() {
    let mut h = harness(&[COURSE_101, COURSE_202]).await;
    h.extractor.crash_on(COURSE_101);
    h.extractor
        .set_snapshot(COURSE_202, snapshot("Networks", vec![("Week 1", Vec::new())]));

    let report = h.monitor.run_cycle().await.expect("cycle");

    assert_eq!(report.failed, 1);
    assert_eq!(report.checked, 1);
    assert!(h.browser.launches() >= 1);
    assert_eq!(h.browser.logins(), 1);
    assert!(h.monitor.state().courses.contains_key("202"));
    assert_eq!(h.browser.cache_clears(), 1);
}

#[tokio::test]
async fn stalled_course_is_abandoned_and_next_course_runs() {
    let repo = DocumentRepo::new(std::sync::Arc::new(db::connect_memory().await.unwrap()));
    let mut h = harness_with(&[COURSE_101, COURSE_202], repo, |config| {
        config.schedule.course_timeout_seconds = 1;
    })
    .await;
    h.extractor.hang_on(COURSE_101);
    h.extractor.set_snapshot(
        COURSE_202,
        snapshot(
            "Networks",
            vec![("Week 1", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, Vec::new()));

    let report = h.monitor.run_cycle().await.expect("cycle");

    assert_eq!(report.timed_out, 1);
    assert_eq!(report.checked, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.new_notices, 1);
    assert!(!h.monitor.state().courses.contains_key("101"));
    assert!(h.monitor.state().courses.contains_key("202"));
}

#[tokio::test]
async fn deadline_overview_lists_courses_in_config_order() {
    let mut h = harness(&[COURSE_202, COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 1", vec![activity("Quiz 1", ActivityKind::Quiz, QUIZ_URL)])],
        ),
    );
    h.extractor.set_snapshot(
        COURSE_202,
        snapshot(
            "Networks",
            vec![("Week 1", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor.set_details(QUIZ_URL, quiz_details(WED_15));
    h.extractor
        .set_details(HW_URL, assignment_details(FRI_17, Vec::new()));

    h.monitor.run_cycle().await.expect("cycle");

    let overview = h
        .gateway
        .messages()
        .into_iter()
        .find(|m| m.text.starts_with("📃"))
        .unwrap()
        .text;
    // Sorted by days remaining: the quiz closing today comes first.
    let algorithms = overview.find("📚 <b>Algorithms</b>").unwrap();
    let networks = overview.find("📚 <b>Networks</b>").unwrap();
    assert!(algorithms < networks);
    assert!(overview.contains("🔴 <b>امروز</b>"));
}

#[tokio::test]
async fn ledger_entries_expire_after_their_deadline() {
    let mut h = harness(&[COURSE_101]).await;
    h.extractor.set_snapshot(
        COURSE_101,
        snapshot(
            "Algorithms",
            vec![("Week 2", vec![activity("HW1", ActivityKind::Assignment, HW_URL)])],
        ),
    );
    h.extractor
        .set_details(HW_URL, assignment_details(WED_15, Vec::new()));
    h.monitor.run_cycle().await.expect("first cycle");
    assert_eq!(h.monitor.state().last_day_reminders.len(), 1);

    h.clock.set(h.clock.get() + Duration::days(1));
    h.monitor.run_cycle().await.expect("second cycle");

    assert!(h.monitor.state().last_day_reminders.is_empty());
}
