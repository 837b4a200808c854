use std::{
    collections::BTreeMap,
    future::Future,
    path::Path,
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use tempfile::TempDir;
use tokio::task::JoinSet;

use super::{
    compare::Comparison,
    fixture::Fixture,
    result::TestOutcome,
    runner::ProcessRunner,
    tally::Tally,
    verdict::{classify, Judgement, Verdict},
};

/// Knobs of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeOptions {
    pub time_limit: Duration,
    /// Halt after the first fixture that is not accepted (or diverges).
    pub fail_fast: bool,
    /// Print diffs and both buffers on mismatch.
    pub verbose: bool,
    pub output_limit_bytes: usize,
    pub stderr_capture_max_bytes: usize,
    pub jobs: usize,
}

impl Default for JudgeOptions {
    fn default() -> Self {
        Self {
            time_limit: ProcessRunner::DEFAULT_TIME_LIMIT,
            fail_fast: true,
            verbose: true,
            output_limit_bytes: ProcessRunner::DEFAULT_OUTPUT_LIMIT_BYTES,
            stderr_capture_max_bytes: ProcessRunner::DEFAULT_STDERR_CAPTURE_MAX_BYTES,
            jobs: 1,
        }
    }
}

impl JudgeOptions {
    pub fn configure(&self, runner: ProcessRunner) -> ProcessRunner {
        runner
            .time_limit(self.time_limit)
            .output_limit_bytes(self.output_limit_bytes)
            .stderr_capture_max_bytes(self.stderr_capture_max_bytes)
    }
}

/// Hooks for progress reporting. Called from the controlling task only,
/// results always in enumeration order.
pub trait SuiteObserver: Send + Sync {
    fn on_start(&self, _fixture_name: &str) {}
    fn on_result(&self, _outcome: &TestOutcome) {}
    fn on_comparison(&self, _comparison: &Comparison) {}
}

/// Observer that reports nothing.
pub struct Silent;

impl SuiteObserver for Silent {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureVerdict {
    pub fixture_name: String,
    pub verdict: Verdict,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct SuiteReport {
    pub tally: Tally,
    /// Every recorded fixture, in enumeration order.
    pub verdicts: Vec<FixtureVerdict>,
    /// Full outcomes of the fixtures that were not accepted.
    pub failures: Vec<TestOutcome>,
    /// Fixtures never run because fail-fast halted the suite.
    pub skipped: usize,
    /// Holds the captured stdout files; deleted with the report.
    pub output_dir: Option<TempDir>,
}

impl SuiteReport {
    pub fn all_accepted(&self) -> bool {
        self.failures.is_empty() && self.skipped == 0
    }

    fn record(&mut self, outcome: TestOutcome) {
        self.tally.add(outcome.verdict);
        self.verdicts.push(FixtureVerdict {
            fixture_name: outcome.fixture_name.clone(),
            verdict: outcome.verdict,
            elapsed: outcome.execution_time(),
        });
        if !outcome.verdict.is_accepted() {
            self.failures.push(outcome);
        }
    }
}

/// Feeds one fixture to the program and classifies what came out.
/// The captured stdout is also written to `dest`.
pub async fn judge_fixture<F>(
    runner: &ProcessRunner,
    fixture: &F,
    dest: &Path,
) -> anyhow::Result<TestOutcome>
where
    F: Fixture + ?Sized,
{
    let (input, answer) = tokio::try_join!(fixture.read_input(), fixture.read_answer())?;
    let run = runner.run_and_save(&input, dest).await?;
    let Judgement { verdict, diff } = classify(&run, &answer);
    log::debug!(
        "{}: {} [{}ms]",
        fixture.name(),
        verdict,
        run.elapsed.as_millis()
    );
    Ok(TestOutcome {
        fixture_name: fixture.name().to_owned(),
        verdict,
        run,
        expected: String::from_utf8_lossy(&answer).into_owned(),
        diff,
    })
}

/// Judges every fixture and tallies the verdicts.
///
/// With `fail_fast`, the suite stops right after the first fixture that is not
/// accepted; that fixture is counted, the rest are neither run nor counted.
/// With `jobs > 1` fixtures run concurrently, but results are recorded in
/// enumeration order and fixtures behind a failure are cancelled, so the
/// tally is the same as a sequential run.
pub async fn run_suite<F>(
    runner: &ProcessRunner,
    fixtures: Vec<F>,
    opts: &JudgeOptions,
    observer: &dyn SuiteObserver,
) -> anyhow::Result<SuiteReport>
where
    F: Fixture + 'static,
{
    let runner = opts.configure(runner.clone());
    let output_dir = self::output_dir()?;
    let fixtures: Vec<Arc<F>> = fixtures.into_iter().map(Arc::new).collect();
    let total = fixtures.len();

    log::info!("Running: {}", runner.get_command());

    let mut report = SuiteReport::default();
    let recorded = run_in_order(
        total,
        opts.jobs,
        |i| {
            let fixture = Arc::clone(&fixtures[i]);
            let runner = runner.clone();
            let dest = output_dir.path().join(output_file_name(i, fixture.name()));
            observer.on_start(fixture.name());
            async move { judge_fixture(&runner, fixture.as_ref(), &dest).await }
        },
        |outcome: &TestOutcome| opts.fail_fast && !outcome.verdict.is_accepted(),
        |outcome| {
            observer.on_result(&outcome);
            report.record(outcome);
        },
    )
    .await?;

    report.skipped = total - recorded;
    report.output_dir = Some(output_dir);
    Ok(report)
}

pub(crate) fn output_dir() -> anyhow::Result<TempDir> {
    tempfile::Builder::new()
        .prefix("kgrader-")
        .tempdir()
        .context("Failed to create a temp dir for captured outputs")
}

/// `<index>-<name>.out`, unique per fixture within a suite.
pub(crate) fn output_file_name(index: usize, fixture_name: &str) -> String {
    format!("{:03}-{}.out", index, fixture_name.replace('/', "_"))
}

/// Starts `count` jobs (at most `jobs` at a time) and hands their results to
/// `record` in index order. Stops after recording an item for which `halts`
/// is true; jobs still running at that point are aborted.
///
/// Returns how many items were recorded.
pub(crate) async fn run_in_order<T, Fut>(
    count: usize,
    jobs: usize,
    mut start: impl FnMut(usize) -> Fut,
    halts: impl Fn(&T) -> bool,
    mut record: impl FnMut(T),
) -> anyhow::Result<usize>
where
    T: Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    if jobs <= 1 {
        for i in 0..count {
            let item = start(i).await?;
            let halt = halts(&item);
            record(item);
            if halt {
                return Ok(i + 1);
            }
        }
        return Ok(count);
    }

    let mut set = JoinSet::new();
    let mut finished: BTreeMap<usize, T> = BTreeMap::new();
    let (mut next_start, mut next_record) = (0, 0);
    let mut saw_halt = false;

    loop {
        // everything before a halting item is already started
        while !saw_halt && next_start < count && set.len() < jobs {
            let fut = start(next_start);
            let index = next_start;
            set.spawn(async move { (index, fut.await) });
            next_start += 1;
        }

        let Some(joined) = set.join_next().await else {
            break;
        };
        let (index, res) = joined.context("Job panicked")?;
        let item = res?;
        saw_halt |= halts(&item);
        finished.insert(index, item);

        while let Some(item) = finished.remove(&next_record) {
            next_record += 1;
            let halt = halts(&item);
            record(item);
            if halt {
                set.abort_all();
                return Ok(next_record);
            }
        }
    }
    Ok(next_record)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::fixture::OnMemoryFixture;
    use std::sync::Mutex;
    use Verdict::*;

    /// Echoes stdin back, logging each input to `log` first.
    fn echo_runner(log: &Path) -> ProcessRunner {
        let cmd = format!("tee -a '{}'", log.to_string_lossy());
        ProcessRunner::new(cmd, ".")
    }

    fn f1_f2_f3() -> Vec<OnMemoryFixture<&'static str>> {
        vec![
            OnMemoryFixture::new("F1", "one\n", "one\n"),
            OnMemoryFixture::new("F2", "two\n", "2\n"),
            OnMemoryFixture::new("F3", "three\n", "three\n"),
        ]
    }

    #[tokio::test]
    async fn fail_fast_halts_after_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ran.log");
        let opts = JudgeOptions::default();

        let report = run_suite(&echo_runner(&log), f1_f2_f3(), &opts, &Silent)
            .await
            .unwrap();

        assert_eq!(
            report.tally.iter().collect::<Vec<_>>(),
            [(Accepted, 1), (WrongAnswer, 1)]
        );
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures[0].fixture_name, "F2");
        assert_eq!(fsutil::read_to_string(&log).unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn without_fail_fast_runs_everything() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ran.log");
        let opts = JudgeOptions {
            fail_fast: false,
            ..Default::default()
        };

        let report = run_suite(&echo_runner(&log), f1_f2_f3(), &opts, &Silent)
            .await
            .unwrap();

        assert_eq!(
            report.tally.iter().collect::<Vec<_>>(),
            [(Accepted, 2), (WrongAnswer, 1)]
        );
        assert_eq!(report.skipped, 0);
        assert!(!report.all_accepted());
        assert_eq!(fsutil::read_to_string(&log).unwrap(), "one\ntwo\nthree\n");
    }

    #[tokio::test]
    async fn parallel_tally_matches_sequential() {
        let fixtures: Vec<_> = (0..8)
            .map(|i| {
                let answer = if i == 5 { "wrong\n".to_owned() } else { format!("{}\n", i) };
                OnMemoryFixture::<String>::new(format!("{}", i), format!("{}\n", i), answer)
            })
            .collect();
        let opts = JudgeOptions {
            jobs: 3,
            ..Default::default()
        };

        let report = run_suite(&ProcessRunner::new("cat", "."), fixtures, &opts, &Silent)
            .await
            .unwrap();

        let names: Vec<_> = report.verdicts.iter().map(|v| v.fixture_name.as_str()).collect();
        assert_eq!(names, ["0", "1", "2", "3", "4", "5"]);
        assert_eq!(
            report.tally.iter().collect::<Vec<_>>(),
            [(Accepted, 5), (WrongAnswer, 1)]
        );
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn saves_each_stdout_to_its_own_file() {
        let fixtures = vec![
            OnMemoryFixture::<&str>::new("a/1", "x\n", "x\n"),
            OnMemoryFixture::<&str>::new("a/2", "y\n", "y\n"),
        ];
        let report = run_suite(
            &ProcessRunner::new("cat", "."),
            fixtures,
            &JudgeOptions::default(),
            &Silent,
        )
        .await
        .unwrap();
        assert!(report.all_accepted());

        let dir = report.output_dir.as_ref().unwrap().path().to_owned();
        assert_eq!(fsutil::read_to_string(dir.join("000-a_1.out")).unwrap(), "x\n");
        assert_eq!(fsutil::read_to_string(dir.join("001-a_2.out")).unwrap(), "y\n");

        drop(report);
        assert!(!dir.exists());
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl SuiteObserver for Recorder {
        fn on_start(&self, name: &str) {
            self.0.lock().unwrap().push(format!("start {}", name));
        }
        fn on_result(&self, outcome: &TestOutcome) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{} {}", outcome.fixture_name, outcome.verdict));
        }
    }

    #[tokio::test]
    async fn observer_sees_every_recorded_fixture() {
        let rec = Recorder::default();
        let fixtures = vec![
            OnMemoryFixture::<&str>::new("first", "x\n", ""),
            OnMemoryFixture::<&str>::new("second", "", ""),
            OnMemoryFixture::<&str>::new("third", "x\n", ""),
        ];
        let report = run_suite(
            &ProcessRunner::new("read x || exit 1", "."),
            fixtures,
            &JudgeOptions::default(),
            &rec,
        )
        .await
        .unwrap();
        assert_eq!(
            *rec.0.lock().unwrap(),
            ["start first", "first AC", "start second", "second RTE"]
        );
        assert_eq!(report.skipped, 1);
    }
}
