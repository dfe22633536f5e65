use serde::Serialize;

use crate::domain::{CachedRow, MetadataRow};
use crate::filters;

#[derive(Debug, Clone, Copy)]
pub struct PreviewInput<'a> {
    pub metadata: &'a [MetadataRow],
    pub filtered_metadata: &'a [MetadataRow],
    pub cached: &'a [CachedRow],
    pub filtered_cached: &'a [CachedRow],
    pub sequence_type: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypedCounts {
    pub filtered_matches: usize,
    pub unfiltered_matches: usize,
    pub filtered_overall: usize,
    pub unfiltered_overall: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UntypedCounts {
    pub filtered_overall: usize,
    pub unfiltered_overall: usize,
}

/// Dry-run summary. Field order is part of the printed format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PreviewCounts {
    pub typed: TypedCounts,
    pub untyped: UntypedCounts,
}

impl PreviewCounts {
    pub fn compute(input: PreviewInput<'_>) -> Self {
        let matches = |rows: &[CachedRow]| match input.sequence_type {
            Some(target) => filters::filter_by_sequence_type(rows, Some(target)).len(),
            None => rows.len(),
        };

        Self {
            typed: TypedCounts {
                filtered_matches: matches(input.filtered_cached),
                unfiltered_matches: matches(input.cached),
                filtered_overall: input.filtered_cached.len(),
                unfiltered_overall: input.cached.len(),
            },
            untyped: UntypedCounts {
                filtered_overall: filters::untyped(input.filtered_metadata, input.filtered_cached)
                    .len(),
                unfiltered_overall: filters::untyped(input.metadata, input.cached).len(),
            },
        }
    }
}
