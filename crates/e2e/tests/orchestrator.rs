//! End-to-end behaviour of the orchestrator against a scripted browser

mod common;

use std::time::Duration;

use common::{context, count, counted, counter, MockDriver};
use gtfs_e2e::{
    E2eError, Orchestrator, OrchestratorConfig, RunMode, Suite, TestContext, TestFactory, TestState,
};

fn config(dir: &tempfile::TempDir) -> OrchestratorConfig {
    OrchestratorConfig {
        screenshot_dir: dir.path().join("screenshots"),
        default_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_passing_chain_records_every_test() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();
    let runs = counter();

    let mut suite = Suite::new();
    let factory = TestFactory::standalone();
    factory.define_test(&mut suite, "login", counted(&runs, false), None, &[]).unwrap();
    factory
        .define_test(&mut suite, "create-feed", counted(&runs, false), None, &["login"])
        .unwrap();
    factory
        .define_test(&mut suite, "upload-gtfs", counted(&runs, false), None, &["create-feed"])
        .unwrap();

    let mut orchestrator = Orchestrator::new(suite, context(&driver), config(&dir)).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert!(report.success());
    assert_eq!(report.passed, 3);
    assert_eq!(count(&runs), 3);
    for name in ["login", "create-feed", "upload-gtfs"] {
        assert_eq!(orchestrator.ledger().get(name), Some(true));
    }
    assert!(driver.screenshots().is_empty());
}

#[tokio::test]
async fn test_failure_blocks_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();
    let upload_runs = counter();
    let other_runs = counter();

    let mut suite = Suite::new();
    let factory = TestFactory::standalone();
    factory.define_test(&mut suite, "login", counted(&other_runs, false), None, &[]).unwrap();
    factory
        .define_test(&mut suite, "create-feed", counted(&other_runs, true), None, &["login"])
        .unwrap();
    factory
        .define_test(&mut suite, "upload-gtfs", counted(&upload_runs, false), None, &["create-feed"])
        .unwrap();

    let mut orchestrator = Orchestrator::new(suite, context(&driver), config(&dir)).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert!(!report.success());
    assert_eq!(count(&upload_runs), 0);

    let create = report.result("create-feed").unwrap();
    assert_eq!(create.outcome, TestState::Failed);
    let shot = create.screenshot.as_ref().unwrap();
    assert!(shot.exists());
    assert!(shot
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with(&format!("create-feed-{}", orchestrator.run_timestamp())));
    assert_eq!(driver.screenshots().len(), 1);

    let upload = report.result("upload-gtfs").unwrap();
    assert_eq!(upload.outcome, TestState::Blocked);
    assert!(upload
        .error
        .as_deref()
        .unwrap()
        .contains("dependent test has not completed"));

    assert_eq!(orchestrator.ledger().get("create-feed"), None);
    assert_eq!(orchestrator.ledger().get("upload-gtfs"), None);
}

#[tokio::test]
async fn test_fail_fast_stops_everything_after_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();
    let later_runs = counter();
    let first_runs = counter();

    let mut suite = Suite::new();
    let factory = TestFactory::standalone();
    factory.define_test(&mut suite, "login", counted(&first_runs, true), None, &[]).unwrap();
    factory
        .define_test(&mut suite, "browse-docs", counted(&later_runs, false), None, &[])
        .unwrap();
    factory
        .define_test(&mut suite, "create-feed", counted(&later_runs, false), None, &["login"])
        .unwrap();

    let mut cfg = config(&dir);
    cfg.fail_fast = true;
    let mut orchestrator = Orchestrator::new(suite, context(&driver), cfg).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(count(&first_runs), 1);
    assert_eq!(count(&later_runs), 0);
    assert!(orchestrator.fail_fast().is_tripped());
    assert_eq!(report.failed, 1);
    assert_eq!(report.fast_failed, 2);

    // Only the first failure leaves a screenshot.
    assert_eq!(driver.screenshots().len(), 1);
    assert!(report.result("login").unwrap().screenshot.is_some());
    assert!(report.result("browse-docs").unwrap().screenshot.is_none());
    assert!(report.result("create-feed").unwrap().screenshot.is_none());

    let docs = report.result("browse-docs").unwrap();
    assert_eq!(docs.outcome, TestState::FastFailed);
    assert!(docs
        .error
        .as_deref()
        .unwrap()
        .contains("failing fast due to previous failure"));
}

#[tokio::test]
async fn test_independent_tests_continue_without_fail_fast() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();
    let runs = counter();

    let mut suite = Suite::new();
    let factory = TestFactory::standalone();
    factory.define_test(&mut suite, "login", counted(&runs, true), None, &[]).unwrap();
    factory.define_test(&mut suite, "browse-docs", counted(&runs, false), None, &[]).unwrap();

    let mut orchestrator = Orchestrator::new(suite, context(&driver), config(&dir)).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert_eq!(count(&runs), 2);
    assert_eq!(report.result("browse-docs").unwrap().outcome, TestState::Passed);
    assert!(!orchestrator.fail_fast().is_tripped());
}

#[tokio::test]
async fn test_isolation_runs_only_the_dependency_closure() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();
    let closure_runs = counter();
    let skipped_runs = counter();

    let mut suite = Suite::new();
    let standalone = TestFactory::standalone();
    let post_login = TestFactory::with_defaults(["login"]);
    standalone.define_test(&mut suite, "login", counted(&closure_runs, false), None, &[]).unwrap();
    post_login
        .define_test(&mut suite, "create-feed", counted(&closure_runs, false), None, &[])
        .unwrap();
    post_login
        .define_test(&mut suite, "delete-user", counted(&skipped_runs, false), None, &[])
        .unwrap();
    post_login
        .define_test(&mut suite, "upload-gtfs", counted(&closure_runs, false), None, &["create-feed"])
        .unwrap();

    let mut cfg = config(&dir);
    cfg.mode = RunMode::Isolate("upload-gtfs".to_string());
    let mut orchestrator = Orchestrator::new(suite, context(&driver), cfg).unwrap();
    let report = orchestrator.run().await.unwrap();

    assert!(report.success());
    assert_eq!(count(&closure_runs), 3);
    assert_eq!(count(&skipped_runs), 0);
    assert_eq!(report.result("delete-user").unwrap().outcome, TestState::SkippedAsPassed);
    assert_eq!(orchestrator.ledger().get("delete-user"), Some(true));
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_isolating_unknown_test_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();
    let mut suite = Suite::new();
    TestFactory::standalone()
        .define_test(&mut suite, "login", counted(&counter(), false), None, &[])
        .unwrap();

    let mut cfg = config(&dir);
    cfg.mode = RunMode::Isolate("nope".to_string());
    let err = Orchestrator::new(suite, context(&driver), cfg).err().unwrap();
    assert!(matches!(err, E2eError::UnknownTest(name) if name == "nope"));
}

#[tokio::test]
async fn test_timeout_fails_with_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();

    let mut suite = Suite::new();
    TestFactory::standalone()
        .define_test(
            &mut suite,
            "upload-gtfs",
            |_ctx: TestContext| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            },
            Some(Duration::from_millis(50)),
            &[],
        )
        .unwrap();

    let mut orchestrator = Orchestrator::new(suite, context(&driver), config(&dir)).unwrap();
    let report = orchestrator.run().await.unwrap();

    let upload = report.result("upload-gtfs").unwrap();
    assert_eq!(upload.outcome, TestState::Failed);
    assert!(upload.error.as_deref().unwrap().contains("timed out"));
    assert!(upload.screenshot.is_some());
}

#[tokio::test]
async fn test_body_drives_the_browser() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();

    let mut suite = Suite::new();
    TestFactory::standalone()
        .define_test(
            &mut suite,
            "login",
            |ctx: TestContext| async move {
                ctx.goto("/").await?;
                ctx.driver.type_text("#username", "admin").await?;
                ctx.driver.click("button[type=submit]").await
            },
            None,
            &[],
        )
        .unwrap();

    let mut orchestrator = Orchestrator::new(suite, context(&driver), config(&dir)).unwrap();
    assert!(orchestrator.run().await.unwrap().success());
    assert_eq!(
        driver.calls(),
        ["goto:/", "type:#username:admin", "click:button[type=submit]"]
    );
}

#[tokio::test]
async fn test_suite_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let driver = MockDriver::new();
    let mut suite = Suite::new();
    TestFactory::standalone()
        .define_test(&mut suite, "login", counted(&counter(), false), None, &[])
        .unwrap();

    let mut orchestrator = Orchestrator::new(suite, context(&driver), config(&dir)).unwrap();
    orchestrator.run().await.unwrap();

    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, E2eError::AlreadyRun(_)));
}
