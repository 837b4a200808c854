use std::{path::Path, sync::Arc};

use tempfile::TempDir;

use super::{
    diff::{unified_diff, Diff},
    fixture::Fixture,
    result::RunOutcome,
    runner::ProcessRunner,
    suite::{self, JudgeOptions, SuiteObserver},
};

/// Outputs of the current and the reference build for the same input.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub fixture_name: String,
    pub current: RunOutcome,
    pub reference: RunOutcome,
    /// From the reference stdout to the current stdout.
    pub diff: Diff,
}

impl Comparison {
    /// Decided by stdout alone. A different exit status is only reported.
    pub fn matched(&self) -> bool {
        self.diff.is_empty()
    }

    pub fn termination_differs(&self) -> bool {
        self.current.termination != self.reference.termination
    }
}

#[derive(Debug, Default)]
pub struct ComparisonReport {
    pub matched: usize,
    pub diverged: Vec<Comparison>,
    pub skipped: usize,
    pub output_dir: Option<TempDir>,
}

impl ComparisonReport {
    pub fn total(&self) -> usize {
        self.matched + self.diverged.len()
    }

    pub fn all_matched(&self) -> bool {
        self.diverged.is_empty() && self.skipped == 0
    }
}

/// Runs both builds on the input of `fixture`, one after the other so they
/// do not compete for the time limit. The answer file is never read.
pub async fn compare_one<F>(
    current: &ProcessRunner,
    reference: &ProcessRunner,
    fixture: &F,
    dest_dir: &Path,
) -> anyhow::Result<Comparison>
where
    F: Fixture + ?Sized,
{
    let input = fixture.read_input().await?;
    let file_name = fixture.name().replace('/', "_");
    let current = current
        .run_and_save(&input, &dest_dir.join(format!("{}.current.out", file_name)))
        .await?;
    let reference = reference
        .run_and_save(&input, &dest_dir.join(format!("{}.reference.out", file_name)))
        .await?;
    let diff = unified_diff(&reference.stdout, &current.stdout, "reference", "current");
    Ok(Comparison {
        fixture_name: fixture.name().to_owned(),
        current,
        reference,
        diff,
    })
}

/// Compares the two builds on every fixture. With `fail_fast` the run stops
/// after the first divergence.
pub async fn run_comparison<F>(
    current: &ProcessRunner,
    reference: &ProcessRunner,
    fixtures: Vec<F>,
    opts: &JudgeOptions,
    observer: &dyn SuiteObserver,
) -> anyhow::Result<ComparisonReport>
where
    F: Fixture + 'static,
{
    let current = opts.configure(current.clone());
    let reference = opts.configure(reference.clone());
    let output_dir = suite::output_dir()?;
    let fixtures: Vec<Arc<F>> = fixtures.into_iter().map(Arc::new).collect();
    let total = fixtures.len();

    log::info!("Current:   {}", current.get_work_dir().to_string_lossy());
    log::info!("Reference: {}", reference.get_work_dir().to_string_lossy());

    let mut report = ComparisonReport::default();
    let recorded = suite::run_in_order(
        total,
        opts.jobs,
        |i| {
            let fixture = Arc::clone(&fixtures[i]);
            let (current, reference) = (current.clone(), reference.clone());
            let dest_dir = output_dir.path().join(format!("{:03}", i));
            observer.on_start(fixture.name());
            async move {
                fsutil::mkdir_all(&dest_dir)?;
                compare_one(&current, &reference, fixture.as_ref(), &dest_dir).await
            }
        },
        |c: &Comparison| opts.fail_fast && !c.matched(),
        |c| {
            observer.on_comparison(&c);
            if c.matched() {
                report.matched += 1;
            } else {
                report.diverged.push(c);
            }
        },
    )
    .await?;

    report.skipped = total - recorded;
    report.output_dir = Some(output_dir);
    Ok(report)
}
