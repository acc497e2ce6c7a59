use std::fmt;

use ahash::AHashMap;
use thiserror::Error;

/// Largest number of distinct read groups a run can hold.
pub const MAX_READ_GROUPS: usize = u8::MAX as usize;

/// Compact id of a read group, handed out in first-seen order starting at 1.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ReadGroupId(u8);

impl ReadGroupId {
    pub fn get(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for ReadGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bidirectional table between read group values and their ids.
///
/// Ids are never reassigned. Once 255 distinct values are interned further values are refused.
#[derive(Debug, Default)]
pub struct ReadGroupCatalog {
    ids: AHashMap<String, ReadGroupId>,
    values: Vec<String>,
}

impl ReadGroupCatalog {
    pub fn new() -> ReadGroupCatalog {
        ReadGroupCatalog::default()
    }

    /// Return the id of `value`, assigning the next free id if it was not seen before.
    pub fn intern(&mut self, value: &str) -> Result<ReadGroupId, CatalogError> {
        if let Some(&id) = self.ids.get(value) {
            return Ok(id);
        }

        let next = u8::try_from(self.values.len() + 1)
            .map_err(|_| CatalogError::Exhausted(value.to_owned()))?;
        let id = ReadGroupId(next);
        self.values.push(value.to_owned());
        self.ids.insert(value.to_owned(), id);

        Ok(id)
    }

    pub fn resolve(&self, id: ReadGroupId) -> Result<&str, CatalogError> {
        self.values
            .get(id.index())
            .map(String::as_str)
            .ok_or(CatalogError::UnknownId(id))
    }

    /// Read group values in ascending id order.
    pub fn groups(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Too many read groups: '{0}' would exceed the limit of {MAX_READ_GROUPS}")]
    Exhausted(String),
    #[error("Read group id {0} was never assigned")]
    UnknownId(ReadGroupId),
}
