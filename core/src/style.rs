use colored::{Color, ColoredString, Colorize};
use crossterm::terminal;
use once_cell::sync::Lazy;

use crate::export::Summary;
use crate::testing::{
    Comparison, ComparisonReport, DiffLine, RunOutcome, SuiteReport, TestOutcome, Verdict,
};

#[macro_export]
macro_rules! print_success {
    ($fmt:literal, $($e:tt)*) => {
        use ::colored::Colorize as _;
        println!("{}", format!($fmt, $($e)*).green())
    }
}

static TRUECOLOR: Lazy<bool> = Lazy::new(|| {
    matches!(
        std::env::var("COLORTERM").as_deref(),
        Ok("truecolor" | "24bit")
    )
});

pub fn is_truecolor_supported() -> bool {
    *TRUECOLOR
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for log::Level {
    fn color(&self) -> Color {
        use log::Level::*;
        match self {
            Error => Color::BrightRed,
            Warn => Color::BrightYellow,
            Info => Color::Cyan,
            Debug => Color::Magenta,
            Trace => Color::Blue,
        }
    }
}

impl ColorTheme for Verdict {
    fn color(&self) -> Color {
        use Verdict::*;
        if !self::is_truecolor_supported() {
            return match self {
                Accepted => Color::Green,
                WrongAnswer => Color::Yellow,
                TimeLimitExceeded | OutputLimitExceeded | MemoryLimitExceeded => Color::Red,
                RuntimeError => Color::Magenta,
                CompileError => Color::Blue,
                New | Running => Color::BrightBlack,
            };
        }

        let (r, g, b) = match self {
            Accepted => (30, 180, 40),
            WrongAnswer => (210, 138, 4),
            TimeLimitExceeded => (220, 42, 42),
            OutputLimitExceeded => (200, 70, 110),
            MemoryLimitExceeded => (190, 60, 60),
            RuntimeError => (171, 40, 200),
            CompileError => (60, 100, 220),
            New | Running => (120, 120, 120),
        };
        Color::TrueColor { r, g, b }
    }
}

pub fn verdict_badge(verdict: Verdict) -> ColoredString {
    let fg = if is_truecolor_supported() {
        Color::TrueColor {
            r: 255,
            g: 255,
            b: 255,
        }
    } else {
        Color::BrightBlack
    };
    format!(" {} ", verdict)
        .on_color(verdict.color())
        .bold()
        .color(fg)
}

fn badge_padding(verdict: Verdict) -> String {
    " ".repeat(3usize.saturating_sub(verdict.to_string().len()))
}

pub fn running_line(fixture_name: &str) -> String {
    format!("Fixture {} ...", fixture_name)
}

pub fn progress_line(outcome: &TestOutcome) -> String {
    format!(
        "Fixture {} ... {}{} [{}ms]",
        outcome.fixture_name,
        verdict_badge(outcome.verdict),
        badge_padding(outcome.verdict),
        outcome.execution_time().as_millis(),
    )
    .cyan()
    .to_string()
}

pub fn comparison_line(c: &Comparison) -> String {
    let mark = if c.matched() {
        " OK ".on_green().black().bold()
    } else {
        " DIFF ".on_red().bright_white().bold()
    };
    let note = if c.termination_differs() {
        format!(
            " ({:?} vs {:?})",
            c.current.termination, c.reference.termination
        )
    } else {
        String::new()
    };
    format!(
        "Fixture {} ... {} [{}ms / {}ms]{}",
        c.fixture_name,
        mark,
        c.current.elapsed.as_millis(),
        c.reference.elapsed.as_millis(),
        note,
    )
    .cyan()
    .to_string()
}

pub fn print_suite_summary(report: &SuiteReport) {
    for (verdict, n) in report.tally.iter() {
        println!("{}: {}", format!("{: <10}", verdict.to_string()).color(verdict.color()), n);
    }
    println!("{: <10}: {}", "TOTAL", report.tally.total());

    let bar = "-".repeat(5);
    print!("{} ", bar);

    let num_run = report.tally.total();
    let num_passed = report.tally.get(Verdict::Accepted);
    let num_failed = num_run - num_passed;

    if report.all_accepted() {
        let msg = format!("All {} tests passed ✨", num_run);
        print!("{}", msg.green());
    } else {
        let summary_msg = if num_passed > 0 {
            format!("{}/{} tests failed 💣", num_failed, num_run)
        } else {
            format!("All {} tests failed 💀", num_run)
        };
        print!("{}", summary_msg.bright_red());
        if report.skipped > 0 {
            print!(" {}", format!("({} not run)", report.skipped).dimmed());
        }
    }

    println!(" {}", bar);
}

pub fn print_comparison_summary(report: &ComparisonReport) {
    let bar = "-".repeat(5);
    print!("{} ", bar);
    if report.all_matched() {
        print!(
            "{}",
            format!("All {} outputs match the reference ✨", report.matched).green()
        );
    } else {
        print!(
            "{}",
            format!("{}/{} outputs diverge 💣", report.diverged.len(), report.total()).bright_red()
        );
        if report.skipped > 0 {
            print!(" {}", format!("({} not run)", report.skipped).dimmed());
        }
    }
    println!(" {}", bar);
}

const BOLD_LINE: &str = "━";
const THIN_LINE: &str = "─";

fn term_cols() -> usize {
    terminal::size().map(|(cols, _)| cols as usize).unwrap_or(40)
}

fn print_title(title: &str, badge: ColoredString, elapsed_ms: u128, cols: usize) -> ColoredString {
    let bold_bar = BOLD_LINE.repeat(cols).blue().bold();
    println!(
        "\n{}: {} [{}ms]\n{}",
        title.color(Color::BrightYellow).bold(),
        badge,
        elapsed_ms,
        bold_bar,
    );
    bold_bar
}

fn print_sub_title(s: &str, cols: usize) {
    println!(
        "{}{}",
        s.cyan().bold(),
        THIN_LINE
            .repeat(cols.saturating_sub(s.chars().count() + 1))
            .bright_black(),
    )
}

fn print_lines(entire_str: &str) {
    let lines: Vec<_> = entire_str.lines().collect();
    if lines.is_empty() {
        println!("{}", "<EMPTY>".magenta().dimmed());
        return;
    }
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim_end();
        print!("{}", trimmed);

        let num_trailing_whitespace = line.len() - trimmed.len();
        if num_trailing_whitespace > 0 {
            print!(
                "{}{}",
                " ".repeat(num_trailing_whitespace).on_red(),
                "(Trailing whitespace)".bright_red().bold()
            );
        }

        let is_last_line = i + 1 == lines.len();
        if is_last_line && !entire_str.ends_with('\n') {
            print!("{}", " Missing new line ".on_yellow().black().bold());
        }

        println!();
    }
}

fn colored_diff_line(line: &DiffLine) -> ColoredString {
    let s = line.to_string();
    match line {
        DiffLine::OldFile(_) | DiffLine::NewFile(_) => s.bold(),
        DiffLine::Hunk { .. } => s.cyan(),
        DiffLine::Removed(_) => s.red(),
        DiffLine::Added(_) => s.green(),
        DiffLine::Context(_) => s.normal(),
    }
}

/// Captured stderr, newline-terminated. Saved stdout is not mentioned since
/// it lives in a temp dir that is gone once the report is dropped.
fn stderr_text(run: &RunOutcome) -> Option<String> {
    if run.stderr.is_empty() {
        return None;
    }
    let mut text = run.stderr_lossy();
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Some(text)
}

fn print_stderr(run: &RunOutcome, title: &str, cols: usize) {
    if let Some(text) = stderr_text(run) {
        print_sub_title(title, cols);
        print!("{}", text);
    }
}

/// Diff, both buffers and stderr of a fixture that was not accepted.
pub fn print_test_result_detail(res: &TestOutcome) {
    let cols = term_cols();
    let bold_bar = print_title(
        &res.fixture_name,
        verdict_badge(res.verdict),
        res.execution_time().as_millis(),
        cols,
    );

    if let Some(diff) = res.diff.as_ref().filter(|d| !d.is_empty()) {
        print_sub_title("[diff]", cols);
        diff.lines()
            .iter()
            .for_each(|line| println!("{}", colored_diff_line(line)));
    }

    print_sub_title("[expected]", cols);
    print_lines(&res.expected);

    print_sub_title("[stdout]", cols);
    print_lines(&res.run.stdout_lossy());

    print_stderr(&res.run, "[stderr]", cols);
    println!("{}", bold_bar);
}

pub fn print_comparison_detail(c: &Comparison) {
    let cols = term_cols();
    let bold_bar = print_title(
        &c.fixture_name,
        " DIFF ".on_red().bright_white().bold(),
        c.current.elapsed.as_millis(),
        cols,
    );

    if c.termination_differs() {
        println!(
            "{} current: {:?}, reference: {:?}",
            "Termination differs:".bright_red().bold(),
            c.current.termination,
            c.reference.termination
        );
    }
    if !c.diff.is_empty() {
        print_sub_title("[diff]", cols);
        c.diff
            .lines()
            .iter()
            .for_each(|line| println!("{}", colored_diff_line(line)));
    }

    print_stderr(&c.current, "[current stderr]", cols);
    print_stderr(&c.reference, "[reference stderr]", cols);
    println!("{}", bold_bar);
}

pub fn print_export_summary(summary: &Summary) {
    println!("{}", summary.problem.bold());
    for group in &summary.verdicts {
        println!(
            "{}{} {: >3}  {}",
            verdict_badge(group.verdict),
            badge_padding(group.verdict),
            group.users.len(),
            group.users.join(", ")
        );
    }
    if !summary.unsubmitted.is_empty() {
        println!(
            "{} {: >3}  {}",
            " --- ".dimmed(),
            summary.unsubmitted.len(),
            summary.unsubmitted.join(", ")
        );
    }
}
