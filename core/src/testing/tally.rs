use super::verdict::Verdict;

/// Count of fixtures per verdict, kept in the order each verdict was first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    counts: Vec<(Verdict, usize)>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, verdict: Verdict) {
        match self.counts.iter_mut().find(|(v, _)| *v == verdict) {
            Some((_, n)) => *n += 1,
            None => self.counts.push((verdict, 1)),
        }
    }

    pub fn get(&self, verdict: Verdict) -> usize {
        self.counts
            .iter()
            .find(|(v, _)| *v == verdict)
            .map_or(0, |&(_, n)| n)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Verdict, usize)> + '_ {
        self.counts.iter().copied()
    }

    pub fn all_accepted(&self) -> bool {
        self.counts.iter().all(|(v, _)| v.is_accepted())
    }
}

impl FromIterator<Verdict> for Tally {
    fn from_iter<I: IntoIterator<Item = Verdict>>(iter: I) -> Self {
        let mut tally = Self::new();
        iter.into_iter().for_each(|v| tally.add(v));
        tally
    }
}
