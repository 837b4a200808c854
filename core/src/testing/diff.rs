//! Line-level unified diff over raw bytes.
//!
//! Buffers are split on `\n` and `\r\n`, so the terminator of a line (and
//! whether the last line has one) never makes a difference. Line contents are
//! compared byte for byte; they are decoded lossily only for display. The edit
//! script is computed with Myers' algorithm after trimming the common prefix
//! and suffix; when the edit distance of the remaining middle exceeds
//! [`MAX_EDIT_DISTANCE`] the middle is reported as one replaced block instead
//! of a minimal script.

use std::fmt;

/// Lines of unchanged context around each change.
pub const CONTEXT_LINES: usize = 3;

pub const MAX_EDIT_DISTANCE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    OldFile(String),
    NewFile(String),
    /// Half-open, 0-based line ranges covered by the hunk.
    Hunk {
        old_start: usize,
        old_end: usize,
        new_start: usize,
        new_end: usize,
    },
    Context(String),
    Removed(String),
    Added(String),
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DiffLine::*;
        match self {
            OldFile(name) => write!(f, "--- {}", name),
            NewFile(name) => write!(f, "+++ {}", name),
            Hunk {
                old_start,
                old_end,
                new_start,
                new_end,
            } => write!(
                f,
                "@@ -{} +{} @@",
                UnifiedRange(*old_start, *old_end),
                UnifiedRange(*new_start, *new_end)
            ),
            Context(line) => write!(f, " {}", line),
            Removed(line) => write!(f, "-{}", line),
            Added(line) => write!(f, "+{}", line),
        }
    }
}

struct UnifiedRange(usize, usize);

impl fmt::Display for UnifiedRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let UnifiedRange(start, stop) = *self;
        match stop - start {
            1 => write!(f, "{}", start + 1),
            0 => write!(f, "{},0", start),
            len => write!(f, "{},{}", start + 1, len),
        }
    }
}

/// An ordered sequence of annotated diff lines. Empty means identical input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    lines: Vec<DiffLine>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> &[DiffLine] {
        &self.lines
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a DiffLine;
    type IntoIter = std::slice::Iter<'a, DiffLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

pub fn unified_diff(
    old: impl AsRef<[u8]>,
    new: impl AsRef<[u8]>,
    old_name: &str,
    new_name: &str,
) -> Diff {
    let a = split_lines(old.as_ref());
    let b = split_lines(new.as_ref());

    let script = edit_script(&a, &b);
    let groups = group_opcodes(opcodes(&script), CONTEXT_LINES);
    if groups.is_empty() {
        return Diff::default();
    }

    let mut lines = vec![
        DiffLine::OldFile(old_name.to_owned()),
        DiffLine::NewFile(new_name.to_owned()),
    ];
    for group in groups {
        let (first, last) = (group[0], group[group.len() - 1]);
        lines.push(DiffLine::Hunk {
            old_start: first.i1,
            old_end: last.i2,
            new_start: first.j1,
            new_end: last.j2,
        });
        for op in group {
            if op.tag == Tag::Equal {
                push_lines(&mut lines, &a[op.i1..op.i2], DiffLine::Context);
                continue;
            }
            push_lines(&mut lines, &a[op.i1..op.i2], DiffLine::Removed);
            push_lines(&mut lines, &b[op.j1..op.j2], DiffLine::Added);
        }
    }
    Diff { lines }
}

/// Lines without their `\n` or `\r\n` terminator. A final terminator does
/// not start another (empty) line.
fn split_lines(buf: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = buf
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();
    if buf.is_empty() || buf.ends_with(b"\n") {
        lines.pop();
    }
    lines
}

fn push_lines(out: &mut Vec<DiffLine>, src: &[&[u8]], wrap: fn(String) -> DiffLine) {
    out.extend(
        src.iter()
            .map(|line| wrap(String::from_utf8_lossy(line).into_owned())),
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Equal,
    Delete,
    Insert,
}

fn edit_script<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Edit> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut script = vec![Edit::Equal; prefix];
    script.extend(myers(
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
    ));
    script.extend(std::iter::repeat(Edit::Equal).take(suffix));
    script
}

fn myers<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Edit> {
    let (n, m) = (a.len() as isize, b.len() as isize);
    let max = (n + m) as usize;
    let offset = max as isize + 1;
    let at = |k: isize| (offset + k) as usize;

    // furthest x reached on each diagonal k = x - y, or -1 if none
    let mut v = vec![0isize; 2 * max + 3];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    for d in 0..=max.min(MAX_EDIT_DISTANCE) as isize {
        trace.push(v[at(-d)..=at(d)].to_vec());
        for k in (-d..=d).step_by(2) {
            let start = if d == 0 {
                Some((0, false))
            } else {
                predecessor(|k| v[at(k)], d, k, n, m)
            };
            let Some((mut x, _)) = start else {
                v[at(k)] = -1;
                continue;
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[at(k)] = x;
            if x == n && y == m {
                return backtrack(&trace, n, m);
            }
        }
    }

    log::debug!(
        "Edit distance exceeds {}; reporting {} removed and {} added lines",
        MAX_EDIT_DISTANCE,
        n,
        m
    );
    let mut script = vec![Edit::Delete; n as usize];
    script.extend(std::iter::repeat(Edit::Insert).take(m as usize));
    script
}

/// Chooses how round `d` (> 0) enters diagonal `k`: down from `k + 1` or right
/// from `k - 1`, whichever reaches further without leaving the edit graph.
/// Returns the x right after that single move and whether it was a move down.
fn predecessor(
    v: impl Fn(isize) -> isize,
    d: isize,
    k: isize,
    n: isize,
    m: isize,
) -> Option<(isize, bool)> {
    let down = (k != d).then(|| v(k + 1)).filter(|&x| x >= 0 && x - k <= m);
    let right = (k != -d).then(|| v(k - 1) + 1).filter(|&x| x > 0 && x <= n);
    match (down, right) {
        (Some(xd), Some(xr)) if xd >= xr => Some((xd, true)),
        (_, Some(xr)) => Some((xr, false)),
        (Some(xd), None) => Some((xd, true)),
        (None, None) => None,
    }
}

/// `trace[d]` holds the diagonals `-d..=d` as they were before round `d`.
fn backtrack(trace: &[Vec<isize>], n: isize, m: isize) -> Vec<Edit> {
    let mut script = Vec::with_capacity((n + m) as usize);
    let (mut x, mut y) = (n, m);

    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        if d == 0 {
            while x > 0 {
                x -= 1;
                script.push(Edit::Equal);
            }
            break;
        }
        let (moved_x, down) = predecessor(|k| v[(k + d) as usize], d, x - y, n, m)
            .expect("every diagonal on the found path has a predecessor");
        while x > moved_x {
            x -= 1;
            y -= 1;
            script.push(Edit::Equal);
        }
        if down {
            y -= 1;
            script.push(Edit::Insert);
        } else {
            x -= 1;
            script.push(Edit::Delete);
        }
    }
    script.reverse();
    script
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Opcode {
    tag: Tag,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
}

fn opcodes(script: &[Edit]) -> Vec<Opcode> {
    let mut codes = Vec::new();
    let (mut i, mut j, mut pos) = (0, 0, 0);

    while pos < script.len() {
        let (i1, j1) = (i, j);
        let tag = if script[pos] == Edit::Equal {
            while pos < script.len() && script[pos] == Edit::Equal {
                i += 1;
                j += 1;
                pos += 1;
            }
            Tag::Equal
        } else {
            while pos < script.len() && script[pos] != Edit::Equal {
                match script[pos] {
                    Edit::Delete => i += 1,
                    _ => j += 1,
                }
                pos += 1;
            }
            match (i > i1, j > j1) {
                (true, true) => Tag::Replace,
                (true, false) => Tag::Delete,
                _ => Tag::Insert,
            }
        };
        codes.push(Opcode {
            tag,
            i1,
            i2: i,
            j1,
            j2: j,
        });
    }
    codes
}

/// Splits opcodes into hunks, each padded with up to `n` lines of context.
fn group_opcodes(mut codes: Vec<Opcode>, n: usize) -> Vec<Vec<Opcode>> {
    if codes.iter().all(|op| op.tag == Tag::Equal) {
        return Vec::new();
    }

    if let Some(first) = codes.first_mut().filter(|op| op.tag == Tag::Equal) {
        first.i1 = first.i1.max(first.i2.saturating_sub(n));
        first.j1 = first.j1.max(first.j2.saturating_sub(n));
    }
    if let Some(last) = codes.last_mut().filter(|op| op.tag == Tag::Equal) {
        last.i2 = last.i2.min(last.i1 + n);
        last.j2 = last.j2.min(last.j1 + n);
    }

    let mut groups = Vec::new();
    let mut group = Vec::new();
    for mut op in codes {
        if op.tag == Tag::Equal && op.i2 - op.i1 > 2 * n {
            group.push(Opcode {
                i2: op.i2.min(op.i1 + n),
                j2: op.j2.min(op.j1 + n),
                ..op
            });
            groups.push(std::mem::take(&mut group));
            op.i1 = op.i1.max(op.i2 - n);
            op.j1 = op.j1.max(op.j2 - n);
        }
        group.push(op);
    }
    if !group.is_empty() && !(group.len() == 1 && group[0].tag == Tag::Equal) {
        groups.push(group);
    }
    groups
}

#[cfg(test)]
mod test {
    use super::*;

    fn render(diff: &Diff) -> Vec<String> {
        diff.lines().iter().map(|l| l.to_string()).collect()
    }

    fn apply<T: Clone>(a: &[T], b: &[T], script: &[Edit]) -> Vec<T> {
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::new();
        for e in script {
            match e {
                Edit::Equal => {
                    out.push(a[i].clone());
                    i += 1;
                    j += 1;
                }
                Edit::Delete => i += 1,
                Edit::Insert => {
                    out.push(b[j].clone());
                    j += 1;
                }
            }
        }
        assert_eq!((i, j), (a.len(), b.len()));
        out
    }

    #[test]
    fn identical_buffers_yield_empty_diff() {
        for s in ["", "\n", "a\nb\nc\n", "no newline", "x\n\n\ny"] {
            assert!(unified_diff(s, s, "a", "b").is_empty(), "{:?}", s);
        }
    }

    #[test]
    fn single_replacement() {
        let diff = unified_diff("1\n2\n3\n", "1\nX\n3\n", "stdout", "expected");
        assert_eq!(
            render(&diff),
            [
                "--- stdout",
                "+++ expected",
                "@@ -1,3 +1,3 @@",
                " 1",
                "-2",
                "+X",
                " 3",
            ]
        );
    }

    #[test]
    fn line_terminators_are_not_compared() {
        assert!(unified_diff("hello_123", "hello_123\n", "a", "b").is_empty());
        assert!(unified_diff("1\n2\n", "1\r\n2\r\n", "a", "b").is_empty());
        assert!(unified_diff("1\r\n2", "1\n2\n", "a", "b").is_empty());
    }

    #[test]
    fn line_contents_are_compared_exactly() {
        // a blank line, trailing whitespace and a lone CR are all content
        assert!(!unified_diff("1\n", "1\n\n", "a", "b").is_empty());
        assert!(!unified_diff("1 \n", "1\n", "a", "b").is_empty());
        assert!(!unified_diff("1\r\r\n", "1\n", "a", "b").is_empty());
        assert!(!unified_diff("", "\n", "a", "b").is_empty());
    }

    #[test]
    fn invalid_utf8_is_compared_as_bytes() {
        let diff = unified_diff(b"\xff\n", b"\xfe\n", "stdout", "expected");
        assert_eq!(
            render(&diff),
            [
                "--- stdout",
                "+++ expected",
                "@@ -1 +1 @@",
                "-\u{FFFD}",
                "+\u{FFFD}",
            ]
        );
        assert!(!unified_diff(b"\xff\n", "\u{FFFD}\n", "a", "b").is_empty());
        assert!(unified_diff(b"\xff\n", b"\xff\r\n", "a", "b").is_empty());
    }

    #[test]
    fn empty_side_uses_zero_length_range() {
        let diff = unified_diff("", "a\nb\n", "x", "y");
        assert_eq!(render(&diff), ["--- x", "+++ y", "@@ -0,0 +1,2 @@", "+a", "+b"]);
    }

    #[test]
    fn distant_changes_get_separate_hunks() {
        let old: String = (1..=20).map(|i| format!("{}\n", i)).collect();
        let new: String = (1..=20)
            .map(|i| match i {
                2 => "two\n".to_owned(),
                19 => "nineteen\n".to_owned(),
                _ => format!("{}\n", i),
            })
            .collect();
        let diff = unified_diff(&old, &new, "a", "b");
        let hunks: Vec<_> = render(&diff)
            .into_iter()
            .filter(|l| l.starts_with("@@"))
            .collect();
        assert_eq!(hunks, ["@@ -1,5 +1,5 @@", "@@ -16,5 +16,5 @@"]);
    }

    #[test]
    fn edit_script_reconstructs_target() {
        let cases: [(&str, &str); 5] = [
            ("abcabba", "cbabac"),
            ("", "xyz"),
            ("xyz", ""),
            ("kitten", "sitting"),
            ("aaaa", "aa"),
        ];
        for (a, b) in cases {
            let a: Vec<char> = a.chars().collect();
            let b: Vec<char> = b.chars().collect();
            let script = edit_script(&a, &b);
            assert_eq!(apply(&a, &b, &script), b);
        }
    }

    #[test]
    fn edit_script_is_minimal() {
        let a: Vec<char> = "abcabba".chars().collect();
        let b: Vec<char> = "cbabac".chars().collect();
        let edits = edit_script(&a, &b)
            .into_iter()
            .filter(|e| *e != Edit::Equal)
            .count();
        assert_eq!(edits, 5);
    }

    #[test]
    fn huge_edit_distance_falls_back_to_block_replace() {
        let a: Vec<u32> = (0..1500).collect();
        let b: Vec<u32> = (10_000..11_500).collect();
        let script = edit_script(&a, &b);
        assert_eq!(apply(&a, &b, &script), b);
        assert!(script.iter().all(|e| *e != Edit::Equal));
    }
}
