//! Builders for the query DSL fragments the admin APIs use.

use serde::Serialize;
use serde_json::{json, Map, Value};

pub fn match_all() -> Value {
    json!({ "match_all": {} })
}

pub fn match_query(field: &str, value: impl Serialize) -> Value {
    json!({ "match": { field: value } })
}

pub fn term(field: &str, value: impl Serialize) -> Value {
    json!({ "term": { field: value } })
}

pub fn range<T: Serialize>(field: &str, gte: Option<T>, lte: Option<T>) -> Value {
    let mut bounds = Map::new();
    if let Some(gte) = gte {
        bounds.insert("gte".to_owned(), json!(gte));
    }
    if let Some(lte) = lte {
        bounds.insert("lte".to_owned(), json!(lte));
    }
    json!({ "range": { field: bounds } })
}

pub fn multi_match(query: &str, fields: &[impl AsRef<str>]) -> Value {
    let fields: Vec<&str> = fields.iter().map(AsRef::as_ref).collect();
    json!({ "multi_match": { "query": query, "fields": fields } })
}

pub fn wildcard(field: &str, pattern: &str) -> Value {
    json!({ "wildcard": { field: pattern } })
}

pub fn prefix(field: &str, prefix: &str) -> Value {
    json!({ "prefix": { field: prefix } })
}

pub fn fuzzy(field: &str, value: &str, fuzziness: &str) -> Value {
    json!({ "fuzzy": { field: { "value": value, "fuzziness": fuzziness } } })
}

pub fn exists(field: &str) -> Value {
    json!({ "exists": { "field": field } })
}

pub fn ids(ids: &[impl AsRef<str>]) -> Value {
    let ids: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
    json!({ "ids": { "values": ids } })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BoolQuery {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<u32>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty() && self.filter.is_empty()
    }

    pub fn into_query(self) -> Value {
        json!({ "bool": self })
    }
}

/// `"a:asc,b:desc"` to `[{"a": {"order": "asc"}}, ...]`. Malformed pairs are skipped.
pub fn parse_sort(sorts: &str) -> Vec<Value> {
    sorts.split(',')
        .filter_map(|pair| {
            let mut parts = pair.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(field), Some(order), None) if !field.trim().is_empty() => {
                    Some(json!({ field.trim(): { "order": order.trim() } }))
                }
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_omits_open_bounds() {
        assert_eq!(
            range("create_time", Some("2024-01-01"), None),
            json!({ "range": { "create_time": { "gte": "2024-01-01" } } })
        );
        assert_eq!(
            range::<i64>("status", None, Some(499)),
            json!({ "range": { "status": { "lte": 499 } } })
        );
    }

    #[test]
    fn bool_query_skips_empty_clauses() {
        let query = BoolQuery {
            must: vec![term("user_id", 7)],
            should: vec![wildcard("path", "*fans*")],
            minimum_should_match: Some(1),
            ..Default::default()
        };
        assert_eq!(
            query.into_query(),
            json!({ "bool": {
                "must": [{ "term": { "user_id": 7 } }],
                "should": [{ "wildcard": { "path": "*fans*" } }],
                "minimum_should_match": 1,
            } })
        );
        assert!(BoolQuery::default().is_empty());
    }

    #[test]
    fn sort_pairs() {
        assert_eq!(
            parse_sort("create_time:desc, status:asc,broken,a:b:c"),
            vec![
                json!({ "create_time": { "order": "desc" } }),
                json!({ "status": { "order": "asc" } }),
            ]
        );
        assert!(parse_sort("").is_empty());
    }

    #[test]
    fn multi_match_lists_fields() {
        assert_eq!(
            multi_match("rust", &["title", "content"]),
            json!({ "multi_match": { "query": "rust", "fields": ["title", "content"] } })
        );
    }
}
