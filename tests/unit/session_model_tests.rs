use std::time::Duration;

use course_sentinel::config::PortalConfig;
use course_sentinel::models::session::SessionState;
use course_sentinel::session::retry::{RetryDecision, RetryPolicy};
use course_sentinel::session::{classify_location, Location};

fn portal() -> PortalConfig {
    PortalConfig {
        login_url: "https://vu.example.ac.ir/login/index.php".into(),
        portal_host: "vu.example.ac.ir".into(),
        login_hosts: vec!["sso.example.ac.ir".into()],
    }
}

#[test]
fn happy_path_transitions_are_valid() {
    use SessionState::*;
    let path = [
        Unauthenticated,
        Navigating,
        AwaitingCredentialEntry,
        AwaitingCaptcha,
        SubmittingForm,
        Authenticated,
    ];
    for pair in path.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
    }
    assert!(AwaitingCredentialEntry.can_transition_to(SubmittingForm), "captcha is optional");
}

#[test]
fn failed_is_reachable_from_any_state() {
    use SessionState::*;
    for state in [
        Unauthenticated,
        Navigating,
        AwaitingCredentialEntry,
        AwaitingCaptcha,
        SubmittingForm,
        Authenticated,
        Failed,
    ] {
        assert!(state.can_transition_to(Failed));
        assert!(state.can_transition_to(Unauthenticated));
    }
}

#[test]
fn skipping_steps_is_rejected() {
    use SessionState::*;
    assert!(!Navigating.can_transition_to(SubmittingForm));
    assert!(!AwaitingCaptcha.can_transition_to(Authenticated));
    assert!(!Failed.can_transition_to(Authenticated));
}

#[test]
fn retry_policy_gives_up_after_max_attempts() {
    let policy = RetryPolicy::new(3, Duration::from_secs(10));

    assert_eq!(policy.max_attempts(), 3);
    assert_eq!(
        policy.after_failure(1),
        RetryDecision::RetryAfter(Duration::from_secs(10))
    );
    assert_eq!(
        policy.after_failure(2),
        RetryDecision::RetryAfter(Duration::from_secs(10))
    );
    assert_eq!(policy.after_failure(3), RetryDecision::GiveUp);
    assert_eq!(policy.relaunch_delay(), Duration::from_secs(5));
}

#[test]
fn retry_policy_allows_at_least_one_attempt() {
    let policy = RetryPolicy::new(0, Duration::ZERO);
    assert_eq!(policy.max_attempts(), 1);
    assert_eq!(policy.after_failure(1), RetryDecision::GiveUp);
}

#[test]
fn classifies_portal_and_login_locations() {
    let portal = portal();
    assert_eq!(
        classify_location(&portal, "https://vu.example.ac.ir/course/view.php?id=1"),
        Location::Portal
    );
    assert_eq!(
        classify_location(&portal, "https://sso.example.ac.ir/oauth/authorize"),
        Location::Login
    );
    assert_eq!(
        classify_location(&portal, "https://vu.example.ac.ir/login/index.php"),
        Location::Login
    );
    assert_eq!(
        classify_location(&portal, "https://elsewhere.example.com/"),
        Location::Unexpected
    );
}
