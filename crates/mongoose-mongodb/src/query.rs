//! Query and update specifications

use bson::{Bson, Document};

/// Sort direction values as the server expects them
pub const ASCENDING: i32 = 1;
pub const DESCENDING: i32 = -1;

/// Find specification: criteria, projection, ordering and bounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub(crate) filter: Document,
    pub(crate) projection: Option<Document>,
    pub(crate) sort: Option<Document>,
    pub(crate) skip: u64,
    pub(crate) limit: i64,
}

impl FindQuery {
    /// Create a query matching every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter document
    pub fn filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    /// Set the projection document
    pub fn projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set the sort order from a client sort spec.
    ///
    /// Each field keeps its position; `-1` sorts descending and any other
    /// value sorts ascending.
    pub fn sort(mut self, spec: &Document) -> Self {
        self.sort = Some(sort_directions(spec));
        self
    }

    /// Set the number of documents to skip (0 = none)
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    /// Set the maximum number of documents to return (0 = no limit)
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn get_filter(&self) -> &Document {
        &self.filter
    }

    pub fn get_projection(&self) -> Option<&Document> {
        self.projection.as_ref()
    }

    pub fn get_sort(&self) -> Option<&Document> {
        self.sort.as_ref()
    }

    pub fn get_skip(&self) -> u64 {
        self.skip
    }

    pub fn get_limit(&self) -> i64 {
        self.limit
    }
}

/// Translate a client sort spec into `field: ±1` pairs, preserving field order
pub fn sort_directions(spec: &Document) -> Document {
    spec.iter()
        .map(|(field, value)| {
            let direction = if is_descending(value) {
                DESCENDING
            } else {
                ASCENDING
            };
            (field.clone(), Bson::Int32(direction))
        })
        .collect()
}

fn is_descending(value: &Bson) -> bool {
    match value {
        Bson::Int32(v) => *v == -1,
        Bson::Int64(v) => *v == -1,
        Bson::Double(v) => *v == -1.0,
        _ => false,
    }
}

/// Update specification: which documents, what change, and how
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    pub criteria: Document,
    pub update: Document,
    pub upsert: bool,
    pub multi: bool,
}

impl UpdateSpec {
    pub fn new(criteria: Document, update: Document) -> Self {
        Self {
            criteria,
            update,
            upsert: false,
            multi: false,
        }
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    /// True if `update` is a whole replacement document rather than a set of
    /// `$` operators
    pub fn is_replacement(&self) -> bool {
        !self
            .update
            .keys()
            .next()
            .is_some_and(|key| key.starts_with('$'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_find_query_new() {
        let query = FindQuery::new();
        assert!(query.get_filter().is_empty());
        assert!(query.get_projection().is_none());
        assert!(query.get_sort().is_none());
        assert_eq!(query.get_skip(), 0);
        assert_eq!(query.get_limit(), 0);
    }

    #[test]
    fn test_find_query_chaining() {
        let filter = doc! { "active": true };
        let projection = doc! { "name": 1 };

        let query = FindQuery::new()
            .filter(filter.clone())
            .projection(projection.clone())
            .sort(&doc! { "name": 1 })
            .skip(5)
            .limit(10);

        assert_eq!(query.get_filter(), &filter);
        assert_eq!(query.get_projection(), Some(&projection));
        assert_eq!(query.get_sort(), Some(&doc! { "name": 1 }));
        assert_eq!(query.get_skip(), 5);
        assert_eq!(query.get_limit(), 10);
    }

    #[test]
    fn test_sort_directions() {
        let spec = doc! { "b": -1, "a": 1, "c": "desc", "d": -1.0, "e": -1_i64, "f": 0 };
        let sort = sort_directions(&spec);

        let keys: Vec<&str> = sort.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "c", "d", "e", "f"]);
        assert_eq!(sort, doc! { "b": -1, "a": 1, "c": 1, "d": -1, "e": -1, "f": 1 });
    }

    #[test]
    fn test_update_spec_defaults() {
        let spec = UpdateSpec::new(doc! { "a": 1 }, doc! { "$set": { "b": 2 } });
        assert!(!spec.upsert);
        assert!(!spec.multi);

        let spec = spec.upsert(true).multi(true);
        assert!(spec.upsert);
        assert!(spec.multi);
    }

    #[test]
    fn test_update_spec_replacement() {
        assert!(!UpdateSpec::new(doc! {}, doc! { "$set": { "b": 2 } }).is_replacement());
        assert!(UpdateSpec::new(doc! {}, doc! { "b": 2 }).is_replacement());
        assert!(UpdateSpec::new(doc! {}, doc! {}).is_replacement());
    }
}
