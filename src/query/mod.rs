//! Ad-hoc query execution.
//!
//! Validation, execution and canonicalization of one SQL text, plus the
//! [`QueryResultSet`] that the export engine and the boundary consume.

pub mod executor;
mod result_set;

pub use executor::QueryExecutor;
pub use result_set::QueryResultSet;

use std::collections::HashSet;

/// Makes column names unique.
///
/// The first occurrence of a name keeps it; later occurrences get `_1`,
/// `_2`, ... in order of appearance, skipping suffixes already taken.
pub fn disambiguate_column_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        let mut candidate = name.to_string();
        let mut suffix = 0;
        while taken.contains(&candidate) {
            suffix += 1;
            candidate = format!("{name}_{suffix}");
        }
        taken.insert(candidate.clone());
        result.push(candidate);
    }

    result
}
