pub mod builder;
pub mod compare;
pub mod diff;
pub mod fixture;
pub mod result;
pub mod runner;
pub mod suite;
pub mod tally;
pub mod verdict;

pub use builder::*;
pub use compare::*;
pub use diff::{unified_diff, Diff, DiffLine};
pub use fixture::*;
pub use result::*;
pub use runner::*;
pub use suite::*;
pub use tally::*;
pub use verdict::*;
