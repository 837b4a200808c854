pub mod error {
    #[allow(unused_imports)]
    pub(crate) use anyhow::{anyhow, bail, ensure, Context as _};
    pub use anyhow::{Error, Result};
}
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Mutex;
use std::time::Duration;

use colored::Colorize as _;
use crossterm::tty::IsTty;
use error::*;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::export::{Export, Summary};
use crate::style;
use crate::testing::{
    run_comparison, run_suite, BuildArtifacts, BuildDriver, Comparison, ComparisonReport,
    FsFixture, JudgeOptions, SuiteObserver, SuiteReport, TestOutcome,
};

/// Which build a pipeline runs and what it is judged against.
#[derive(Debug, Clone)]
pub struct Target<'a> {
    pub config: &'a Config,
    pub problem: &'a str,
    pub work_dir: &'a Path,
}

pub fn init(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let path = dir.as_ref().join(Config::FILENAME);
    ensure!(!path.exists(), "Already exists: {}", path.to_string_lossy());
    fsutil::write_with_mkdir(&path, Config::example_toml())
        .context("Failed to write example config")?;
    Ok(path)
}

/// Resolves to an error on Ctrl-C, dropping `fut` (and with it any running
/// child process, build artifact and captured output).
async fn interruptible<T>(fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        res = fut => res,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    }
}

fn enumerate_fixtures(t: &Target<'_>) -> Result<Vec<FsFixture>> {
    let layout = t.config.fixture_layout();
    let fixtures = layout
        .enumerate(t.problem)
        .context("Failed to find fixtures")?;
    ensure!(
        !fixtures.is_empty(),
        "No fixture in {}",
        layout.data_dir(t.problem).to_string_lossy()
    );
    Ok(fixtures)
}

async fn build(t: &Target<'_>) -> Result<(BuildDriver, BuildArtifacts)> {
    let driver = BuildDriver::new(&t.config.build, t.work_dir, t.problem)
        .with_context(|| format!("Cannot prepare build in {}", t.work_dir.to_string_lossy()))?;
    let artifacts = driver
        .build()
        .await
        .with_context(|| format!("Build failed in {}", t.work_dir.to_string_lossy()))?;
    Ok((driver, artifacts))
}

/// Builds the target and judges it against every fixture of the problem.
pub async fn evaluate(t: &Target<'_>, opts: &JudgeOptions) -> Result<SuiteReport> {
    interruptible(async {
        let fixtures = self::enumerate_fixtures(t)?;
        let (driver, _artifacts) = self::build(t).await?;

        let observer = TerminalObserver::new();
        let report = run_suite(&driver.runner(), fixtures, opts, &observer).await?;
        drop(observer);
        println!();

        if opts.verbose {
            report
                .failures
                .iter()
                .for_each(style::print_test_result_detail);
        }
        style::print_suite_summary(&report);
        Ok(report)
    })
    .await
}

/// Builds both the target and the reference, then checks that they print the
/// same for every fixture input.
pub async fn compare(
    t: &Target<'_>,
    reference_dir: &Path,
    opts: &JudgeOptions,
) -> Result<ComparisonReport> {
    ensure!(
        reference_dir.is_dir(),
        "Reference dir not found: {}",
        reference_dir.to_string_lossy()
    );
    interruptible(async {
        let fixtures = self::enumerate_fixtures(t)?;
        let (current, _current_artifacts) = self::build(t).await?;
        let (reference, _reference_artifacts) = self::build(&Target {
            work_dir: reference_dir,
            ..t.clone()
        })
        .await?;

        let observer = TerminalObserver::new();
        let report = run_comparison(
            &current.runner(),
            &reference.runner(),
            fixtures,
            opts,
            &observer,
        )
        .await?;
        drop(observer);
        println!();

        if opts.verbose {
            report
                .diverged
                .iter()
                .for_each(style::print_comparison_detail);
        }
        style::print_comparison_summary(&report);
        Ok(report)
    })
    .await
}

/// Builds the target and runs it once on `input` with the terminal attached.
/// A relative `input` that does not exist is looked up in the fixture dir.
pub async fn run_one(t: &Target<'_>, input: &Path) -> Result<ExitStatus> {
    let input = if input.is_relative() && !input.exists() {
        t.config.fixture_layout().data_dir(t.problem).join(input)
    } else {
        input.to_owned()
    };
    let payload = fsutil::read(&input)?;

    interruptible(async {
        let (driver, _artifacts) = self::build(t).await?;
        println!("{}", format!("[{}]", input.to_string_lossy()).bold());
        driver.runner().run_attached(&payload).await
    })
    .await
}

/// Best verdict of each student on `problem`, from a course export.
pub fn summarize_export(
    export_file: impl AsRef<Path>,
    problem: &str,
    assignment: Option<&str>,
    only: &[String],
) -> Result<Summary> {
    let export = Export::load(export_file).context("Failed to load export")?;

    let best = match assignment {
        Some(name) => {
            let asm = export
                .find_assignment(name)
                .with_context(|| format!("No such assignment: '{}'", name))?;
            export.best_verdicts([asm])
        }
        None => export.best_verdicts(&export.assignments),
    };

    let summary = if only.is_empty() {
        best.summarize(problem, &export.student_usernames())
    } else {
        best.summarize(problem, only)
    };
    Ok(summary)
}

/// Spinner per running fixture on a terminal, plain lines otherwise.
struct TerminalObserver {
    progress: Option<MultiProgress>,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl TerminalObserver {
    fn new() -> Self {
        let progress = std::io::stderr().is_tty().then(MultiProgress::new);
        Self {
            progress,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn finish(&self, fixture_name: &str, line: String) {
        let bar = self
            .bars
            .lock()
            .ok()
            .and_then(|mut bars| bars.remove(fixture_name));
        match bar {
            Some(bar) => bar.finish_with_message(line),
            None => println!("{}", line),
        }
    }
}

impl SuiteObserver for TerminalObserver {
    fn on_start(&self, fixture_name: &str) {
        let Some(progress) = &self.progress else {
            return;
        };
        let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") else {
            return;
        };
        let bar = progress
            .add(ProgressBar::new_spinner())
            .with_style(style)
            .with_message(style::running_line(fixture_name));
        bar.enable_steady_tick(Duration::from_millis(50));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(fixture_name.to_owned(), bar);
        }
    }

    fn on_result(&self, outcome: &TestOutcome) {
        self.finish(&outcome.fixture_name, style::progress_line(outcome));
    }

    fn on_comparison(&self, c: &Comparison) {
        self.finish(&c.fixture_name, style::comparison_line(c));
    }
}
