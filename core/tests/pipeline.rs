use std::path::Path;

use kgrader_core::action::{self, Target};
use kgrader_core::config::BuildConfig;
use kgrader_core::testing::{FixtureLayout, JudgeOptions, SourcePattern, Verdict};
use kgrader_core::Config;

const SQUARE: &str = "read n; echo $((n * n))\n";

fn config(root: &Path) -> Config {
    Config {
        fixture: FixtureLayout {
            root: root.to_owned(),
            ..Default::default()
        },
        build: BuildConfig {
            sources: SourcePattern::parse("*.sh").unwrap(),
            compile: Some("cat #{sources} > prog".to_owned()),
            run: "sh prog".to_owned(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn write_fixtures(root: &Path, cases: &[(&str, &str, &str)]) {
    for (name, input, answer) in cases {
        let data = root.join("square_data");
        fsutil::write_with_mkdir(data.join(format!("{}.in", name)), input).unwrap();
        fsutil::write_with_mkdir(data.join(format!("{}.ans", name)), answer).unwrap();
    }
}

fn write_solution(dir: &Path, body: &str) {
    fsutil::write_with_mkdir(dir.join("solution.sh"), body).unwrap();
}

#[tokio::test]
async fn evaluate_builds_judges_and_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("work");
    write_solution(&work, SQUARE);
    write_fixtures(
        root.path(),
        &[("1", "2\n", "4\n"), ("2", "3\n", "9\n"), ("3", "4\n", "15\n")],
    );

    let cfg = config(root.path());
    let target = Target {
        config: &cfg,
        problem: "square",
        work_dir: &work,
    };
    let opts = JudgeOptions {
        fail_fast: false,
        ..Default::default()
    };

    let report = action::evaluate(&target, &opts).await.unwrap();
    assert_eq!(
        report.tally.iter().collect::<Vec<_>>(),
        [(Verdict::Accepted, 2), (Verdict::WrongAnswer, 1)]
    );
    assert_eq!(report.failures[0].fixture_name, "3");
    assert!(report.failures[0].diff.as_ref().map_or(false, |d| !d.is_empty()));

    // build output is gone, sources are not
    assert!(!work.join("prog").exists());
    assert!(work.join("solution.sh").exists());
}

#[tokio::test]
async fn evaluate_classifies_crashes_and_timeouts() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("work");
    write_solution(
        &work,
        "read n\n[ $n = 0 ] && exit 3\n[ $n = 1 ] && exec sleep 5\necho $n\n",
    );
    write_fixtures(
        root.path(),
        &[("a", "0\n", "0\n"), ("b", "1\n", "1\n"), ("c", "2\n", "2\n")],
    );

    let cfg = config(root.path());
    let opts = JudgeOptions {
        fail_fast: false,
        verbose: false,
        ..Default::default()
    };
    let report = action::evaluate(
        &Target {
            config: &cfg,
            problem: "square",
            work_dir: &work,
        },
        &opts,
    )
    .await
    .unwrap();

    let verdicts: Vec<_> = report.verdicts.iter().map(|v| v.verdict).collect();
    assert_eq!(
        verdicts,
        [
            Verdict::RuntimeError,
            Verdict::TimeLimitExceeded,
            Verdict::Accepted
        ]
    );
}

#[tokio::test]
async fn missing_answer_aborts_before_building() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("work");
    write_solution(&work, SQUARE);
    write_fixtures(root.path(), &[("1", "2\n", "4\n")]);
    fsutil::write(root.path().join("square_data/2.in"), "3\n").unwrap();

    let cfg = config(root.path());
    let res = action::evaluate(
        &Target {
            config: &cfg,
            problem: "square",
            work_dir: &work,
        },
        &JudgeOptions::default(),
    )
    .await;
    assert!(res.is_err());
    assert!(!work.join("prog").exists());
}

#[tokio::test]
async fn failing_build_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("work");
    write_solution(&work, SQUARE);
    write_fixtures(root.path(), &[("1", "2\n", "4\n")]);

    let mut cfg = config(root.path());
    cfg.build.compile = Some("exit 1".to_owned());
    let res = action::evaluate(
        &Target {
            config: &cfg,
            problem: "square",
            work_dir: &work,
        },
        &JudgeOptions::default(),
    )
    .await;
    assert!(res.is_err());
}

#[tokio::test]
async fn compare_ignores_answers_and_reports_divergence() {
    let root = tempfile::tempdir().unwrap();
    let work = root.path().join("work");
    let reference = root.path().join("__original__");
    write_solution(&work, "read n; echo $((n * n))\n");
    write_solution(&reference, "read n; echo $((n * n))\n");
    // answers are deliberately wrong
    write_fixtures(root.path(), &[("1", "2\n", "x\n"), ("2", "3\n", "y\n")]);

    let cfg = config(root.path());
    let target = Target {
        config: &cfg,
        problem: "square",
        work_dir: &work,
    };
    let report = action::compare(&target, &reference, &JudgeOptions::default())
        .await
        .unwrap();
    assert!(report.all_matched());
    assert_eq!(report.matched, 2);
    assert!(!work.join("prog").exists());
    assert!(!reference.join("prog").exists());

    write_solution(&work, "read n; echo $((n + n))\n");
    let report = action::compare(&target, &reference, &JudgeOptions::default())
        .await
        .unwrap();
    // 2+2 == 2*2, so the first fixture still matches
    assert_eq!(report.matched, 1);
    assert_eq!(report.diverged.len(), 1);
    assert_eq!(report.diverged[0].fixture_name, "2");
}

#[tokio::test]
async fn config_default_reference_dir_is_relative_to_config_file() {
    let root = tempfile::tempdir().unwrap();
    fsutil::write(root.path().join(Config::FILENAME), "problem = \"square\"\n").unwrap();
    let cfg = Config::from_file_finding_in_ancestors(root.path()).unwrap();
    assert_eq!(cfg.problem.as_deref(), Some("square"));
    assert_eq!(cfg.reference_dir(), root.path().join("__original__"));
}
