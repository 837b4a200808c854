//! Kattis course export: the submission records of a whole course.
//!
//! Only read here, to report which verdict each student reached on a problem.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::testing::Verdict;

#[derive(Debug, Clone, Deserialize)]
pub struct Export {
    pub students: Vec<Student>,
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Student {
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub non_anonymous: bool,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Teacher {
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub teaching_assistant: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub name: String,
    #[serde(default)]
    pub length: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub starttime: DateTime<Utc>,
    pub groups: Vec<Group>,
    #[serde(default)]
    pub problems: Vec<ProblemResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub group_name: String,
    #[serde(default)]
    pub solved_count: usize,
    #[serde(default)]
    pub members: Vec<String>,
    /// Keyed by problem name.
    pub results: BTreeMap<String, ProblemResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProblemResult {
    #[serde(default)]
    pub submission_count: usize,
    pub submissions: Vec<Submission>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub submission_id: u64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub real_time: f64,
    pub submitting_user: String,
    pub verdict: Verdict,
}

impl Export {
    pub fn load(path: impl AsRef<Path>) -> fsutil::Result<Self> {
        fsutil::read_json_with_deserialize(path)
    }

    pub fn student_usernames(&self) -> Vec<&str> {
        self.students.iter().map(|s| s.username.as_str()).collect()
    }

    pub fn find_assignment(&self, name: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.name == name)
    }

    /// Best verdict per (student, problem) over the given assignments.
    /// Submissions by users that are not students are ignored.
    pub fn best_verdicts<'a>(
        &self,
        assignments: impl IntoIterator<Item = &'a Assignment>,
    ) -> BestVerdicts {
        let students: HashSet<&str> = self.student_usernames().into_iter().collect();
        let mut best = BestVerdicts::default();
        for asm in assignments {
            for (problem, sub) in asm.submissions() {
                if !students.contains(sub.submitting_user.as_str()) {
                    log::trace!("Skip submission by non-student {}", sub.submitting_user);
                    continue;
                }
                best.offer(&sub.submitting_user, problem, sub.verdict);
            }
        }
        best
    }
}

impl Assignment {
    /// `(problem name, submission)` over every group, in export order.
    pub fn submissions(&self) -> impl Iterator<Item = (&str, &Submission)> {
        self.groups.iter().flat_map(|group| {
            group.results.iter().flat_map(|(problem, result)| {
                result
                    .submissions
                    .iter()
                    .map(move |sub| (problem.as_str(), sub))
            })
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BestVerdicts {
    by_user: HashMap<String, HashMap<String, Verdict>>,
}

impl BestVerdicts {
    /// Keeps `verdict` unless a strictly better one is already known, so of
    /// equally ranked submissions the one offered last wins.
    pub fn offer(&mut self, user: &str, problem: &str, verdict: Verdict) {
        let per_problem = self.by_user.entry(user.to_owned()).or_default();
        per_problem
            .entry(problem.to_owned())
            .and_modify(|cur| *cur = cur.better(verdict))
            .or_insert(verdict);
    }

    pub fn get(&self, user: &str, problem: &str) -> Option<Verdict> {
        self.by_user.get(user)?.get(problem).copied()
    }

    /// Groups `users` by their best verdict on `problem`, best verdict first.
    pub fn summarize<S: AsRef<str>>(&self, problem: &str, users: &[S]) -> Summary {
        let mut groups: BTreeMap<Verdict, Vec<String>> = BTreeMap::new();
        let mut unsubmitted = Vec::new();
        for user in users.iter().map(|u| u.as_ref()) {
            match self.get(user, problem) {
                Some(v) => groups.entry(v).or_default().push(user.to_owned()),
                None => unsubmitted.push(user.to_owned()),
            }
        }
        Summary {
            problem: problem.to_owned(),
            verdicts: groups
                .into_iter()
                .rev()
                .map(|(verdict, users)| VerdictGroup { verdict, users })
                .collect(),
            unsubmitted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub problem: String,
    pub verdicts: Vec<VerdictGroup>,
    pub unsubmitted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerdictGroup {
    pub verdict: Verdict,
    pub users: Vec<String>,
}
