use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::diff::{self, Diff};
use super::result::{RunOutcome, Termination};

/// Outcome classification of a single run.
///
/// Verdicts are totally ordered by [`Verdict::rank`]: a higher rank is more
/// favorable, and `AC` ranks highest. The short codes are what both the
/// terminal output and submission exports use.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum Verdict {
    #[serde(rename = "New")]
    #[strum(serialize = "New")]
    New,

    #[serde(rename = "Running")]
    #[strum(serialize = "Running")]
    Running,

    #[serde(rename = "CE")]
    #[strum(serialize = "CE")]
    CompileError,

    #[serde(rename = "RTE")]
    #[strum(serialize = "RTE")]
    RuntimeError,

    #[serde(rename = "WA")]
    #[strum(serialize = "WA")]
    WrongAnswer,

    #[serde(rename = "MLE")]
    #[strum(serialize = "MLE")]
    MemoryLimitExceeded,

    #[serde(rename = "TLE")]
    #[strum(serialize = "TLE")]
    TimeLimitExceeded,

    #[serde(rename = "OLE")]
    #[strum(serialize = "OLE")]
    OutputLimitExceeded,

    #[serde(rename = "AC")]
    #[strum(serialize = "AC")]
    Accepted,
}

impl Verdict {
    pub const fn rank(self) -> u8 {
        use Verdict::*;
        match self {
            New => 0,
            Running => 1,
            CompileError => 2,
            RuntimeError => 3,
            WrongAnswer => 4,
            MemoryLimitExceeded => 5,
            TimeLimitExceeded => 6,
            OutputLimitExceeded => 7,
            Accepted => 8,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == Verdict::Accepted
    }

    /// The more favorable of the two; `challenger` wins a tie.
    pub fn better(self, challenger: Verdict) -> Verdict {
        if challenger >= self {
            challenger
        } else {
            self
        }
    }
}

impl PartialOrd for Verdict {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Verdict {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// A verdict together with the diff that decided it, if any was computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub verdict: Verdict,
    pub diff: Option<Diff>,
}

/// Classifies a finished run against the expected output.
///
/// Precedence: timeout, then output ceiling, then abnormal exit, then the
/// content of stdout. The diff is only computed when the program exited
/// normally with status 0.
pub fn classify(outcome: &RunOutcome, expected: &[u8]) -> Judgement {
    let verdict = match outcome.termination {
        Termination::TimedOut => Verdict::TimeLimitExceeded,
        Termination::OutputLimitExceeded => Verdict::OutputLimitExceeded,
        Termination::Exited(0) => {
            let diff = diff::unified_diff(&outcome.stdout, expected, "stdout", "expected");
            let verdict = if diff.is_empty() {
                Verdict::Accepted
            } else {
                Verdict::WrongAnswer
            };
            return Judgement {
                verdict,
                diff: Some(diff),
            };
        }
        Termination::Exited(_) | Termination::Signaled => Verdict::RuntimeError,
    };
    Judgement {
        verdict,
        diff: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{str::FromStr, time::Duration};
    use strum::IntoEnumIterator;

    fn outcome(termination: Termination, stdout: &str) -> RunOutcome {
        RunOutcome {
            termination,
            stdout: stdout.into(),
            stderr: Vec::new(),
            elapsed: Duration::from_millis(10),
            saved_stdout: None,
        }
    }

    #[test]
    fn rank_follows_declaration_order() {
        let all: Vec<_> = Verdict::iter().collect();
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                assert_eq!(a.rank() < b.rank(), i < j, "{} vs {}", a, b);
                assert_eq!(a < b, i < j);
            }
        }
        assert!(all.iter().all(|&v| v <= Verdict::Accepted));
        assert_eq!(all.iter().max(), Some(&Verdict::Accepted));
    }

    #[test]
    fn rank_is_not_string_order() {
        // "AC" < "WA" lexically, but AC is the most favorable.
        assert!(Verdict::Accepted > Verdict::WrongAnswer);
        assert!(Verdict::TimeLimitExceeded > Verdict::RuntimeError);
    }

    #[test]
    fn better_prefers_challenger_on_tie() {
        use Verdict::*;
        assert_eq!(WrongAnswer.better(Accepted), Accepted);
        assert_eq!(Accepted.better(WrongAnswer), Accepted);
        assert_eq!(TimeLimitExceeded.better(TimeLimitExceeded), TimeLimitExceeded);
    }

    #[test]
    fn short_codes_roundtrip_through_strum_and_serde() {
        assert_eq!(Verdict::RuntimeError.to_string(), "RTE");
        assert_eq!(Verdict::from_str("OLE").unwrap(), Verdict::OutputLimitExceeded);
        let v: Verdict = serde_json::from_str(r#""CE""#).unwrap();
        assert_eq!(v, Verdict::CompileError);
        assert_eq!(serde_json::to_string(&Verdict::Accepted).unwrap(), r#""AC""#);
    }

    #[test]
    fn timeout_wins_over_matching_output() {
        let j = classify(&outcome(Termination::TimedOut, "42\n"), b"42\n");
        assert_eq!(j.verdict, Verdict::TimeLimitExceeded);
        assert_eq!(j.diff, None);
    }

    #[test]
    fn nonzero_exit_wins_over_matching_output() {
        let j = classify(&outcome(Termination::Exited(1), "42\n"), b"42\n");
        assert_eq!(j.verdict, Verdict::RuntimeError);

        let j = classify(&outcome(Termination::Signaled, "42\n"), b"42\n");
        assert_eq!(j.verdict, Verdict::RuntimeError);
    }

    #[test]
    fn output_limit_is_its_own_verdict() {
        let j = classify(&outcome(Termination::OutputLimitExceeded, "42\n"), b"42\n");
        assert_eq!(j.verdict, Verdict::OutputLimitExceeded);
    }

    #[test]
    fn content_decides_after_clean_exit() {
        let j = classify(&outcome(Termination::Exited(0), "42\n"), b"42\n");
        assert_eq!(j.verdict, Verdict::Accepted);
        assert!(j.diff.unwrap().is_empty());

        let j = classify(&outcome(Termination::Exited(0), "41\n"), b"42\n");
        assert_eq!(j.verdict, Verdict::WrongAnswer);
        assert!(!j.diff.unwrap().is_empty());
    }

    #[test]
    fn line_terminators_do_not_matter() {
        let j = classify(&outcome(Termination::Exited(0), "42"), b"42\n");
        assert_eq!(j.verdict, Verdict::Accepted);

        let j = classify(&outcome(Termination::Exited(0), "1\n2\n"), b"1\r\n2\r\n");
        assert_eq!(j.verdict, Verdict::Accepted);
    }

    #[test]
    fn undecodable_output_is_compared_byte_for_byte() {
        let invalid = RunOutcome {
            stdout: vec![0xff, b'\n'],
            ..outcome(Termination::Exited(0), "")
        };
        assert_eq!(classify(&invalid, &[0xfe, b'\n']).verdict, Verdict::WrongAnswer);
        assert_eq!(
            classify(&invalid, "\u{FFFD}\n".as_bytes()).verdict,
            Verdict::WrongAnswer
        );
        assert_eq!(classify(&invalid, &[0xff, b'\n']).verdict, Verdict::Accepted);
    }
}
