#![deny(missing_docs)]
#![doc = "Intra- and inter-experiment statistics and collation over batch outputs."]

pub mod group;
pub mod reducer;
pub mod selection;
pub mod stats;
/// Delimiter-separated numeric tables.
pub mod table;

pub use group::{intra_groups, GroupInput, ReductionGroup, Scope, SourceKey, COLLATED_DIR};
pub use reducer::{reduce_inter, reduce_intra, GroupReport, Reducer, EXPERIMENT_INDEX};
pub use selection::Selection;
pub use stats::{Statistic, Summary};
pub use table::{delimiter_byte, Table};
