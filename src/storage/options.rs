use crate::core::{Document, Value, lookup_path};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Numeric form used in index names and key patterns (`1` / `-1`).
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Options for `find`: sort keys, then skip, then limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<(String, SortDirection)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnDocument {
    Before,
    #[default]
    After,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    pub return_document: ReturnDocument,
    pub sort: Vec<(String, SortDirection)>,
}

impl FindOneAndUpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn return_document(mut self, which: ReturnDocument) -> Self {
        self.return_document = which;
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }
}

/// Compare two documents by a list of sort keys. Missing fields sort as null.
pub fn compare_documents(a: &Document, b: &Document, sort: &[(String, SortDirection)]) -> Ordering {
    for (field, direction) in sort {
        let left = lookup_path(a, field).unwrap_or(&Value::Null);
        let right = lookup_path(b, field).unwrap_or(&Value::Null);
        let ord = match direction {
            SortDirection::Ascending => left.cmp(right),
            SortDirection::Descending => right.cmp(left),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
