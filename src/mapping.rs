//! Mapping-style access shared by templates (keyed by identifier) and rows
//! (keyed by category).

use crate::error::Result;

pub trait MetadataMap {
    type Item;

    /// Keys in ascending order.
    fn keys(&self) -> Result<Vec<String>>;

    /// Strict access; unknown keys are an error.
    fn lookup(&self, key: &str) -> Result<Self::Item>;

    /// Lenient access; unknown keys give `None`, other failures still propagate.
    fn get(&self, key: &str) -> Result<Option<Self::Item>> {
        match self.lookup(key) {
            Ok(item) => Ok(Some(item)),
            Err(err) if err.is_missing_key() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.keys()?.iter().any(|k| k == key))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.keys()?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn values(&self) -> Result<Vec<Self::Item>> {
        self.keys()?.iter().map(|key| self.lookup(key)).collect()
    }

    fn items(&self) -> Result<Vec<(String, Self::Item)>> {
        self.keys()?
            .into_iter()
            .map(|key| {
                let item = self.lookup(&key)?;
                Ok((key, item))
            })
            .collect()
    }
}
