//! Document store. Filters are the Mongo-style documents produced by [`DocumentTranslator`];
//! one lock acquisition per operation keeps each operation atomic. With a [`Journal`] every
//! mutation is committed to redb before the in-memory view changes.

use super::journal::{DocumentDb, Journal};
use super::{assign_pk, resolve_window, strip_pk, PersistenceProvider, ProviderConfig, QueryOptions, Record, SortKey};
use crate::criteria::{CriteriaNode, CriteriaTranslator, DocumentFilter, DocumentTranslator, MAX_DEPTH};
use crate::error::AppError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use tokio::sync::RwLock;

/// Compiled form of a [`DocumentFilter`].
#[derive(Debug)]
pub enum DocumentMatcher {
    All(Vec<DocumentMatcher>),
    Any(Vec<DocumentMatcher>),
    Field { path: Vec<String>, tests: Vec<FieldTest> },
}

#[derive(Debug)]
pub enum FieldTest {
    Eq(Value),
    Ne(Value),
    Cmp(Ordering, bool, Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Regex(Regex),
}

impl DocumentMatcher {
    pub fn compile(filter: &DocumentFilter) -> Result<Self, AppError> {
        Self::compile_value(filter.as_value())
    }

    fn compile_value(doc: &Value) -> Result<Self, AppError> {
        Self::compile_nested(doc, 1)
    }

    fn compile_nested(doc: &Value, depth: usize) -> Result<Self, AppError> {
        if depth > MAX_DEPTH {
            return Err(AppError::malformed(format!("filter nested deeper than {}", MAX_DEPTH)));
        }
        let obj = doc
            .as_object()
            .ok_or_else(|| AppError::malformed("filter document must be an object"))?;
        let mut parts = Vec::with_capacity(obj.len());
        for (key, val) in obj {
            match key.as_str() {
                "$and" | "$or" => {
                    let items = val
                        .as_array()
                        .ok_or_else(|| AppError::malformed(format!("{} expects an array", key)))?;
                    let children = items
                        .iter()
                        .map(|item| Self::compile_nested(item, depth + 1))
                        .collect::<Result<Vec<_>, _>>()?;
                    parts.push(if key == "$and" {
                        DocumentMatcher::All(children)
                    } else {
                        DocumentMatcher::Any(children)
                    });
                }
                k if k.starts_with('$') => return Err(AppError::malformed(format!("unknown operator {}", k))),
                field => parts.push(DocumentMatcher::Field {
                    path: field.split('.').map(str::to_string).collect(),
                    tests: compile_tests(val)?,
                }),
            }
        }
        Ok(DocumentMatcher::All(parts))
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            DocumentMatcher::All(parts) => parts.iter().all(|p| p.matches(record)),
            DocumentMatcher::Any(parts) => parts.iter().any(|p| p.matches(record)),
            DocumentMatcher::Field { path, tests } => {
                let value = lookup(record, path);
                tests.iter().all(|t| t.accepts(value))
            }
        }
    }
}

fn is_operator_doc(val: &Value) -> bool {
    match val.as_object() {
        Some(m) => !m.is_empty() && m.keys().all(|k| k.starts_with('$')),
        None => false,
    }
}

fn compile_tests(val: &Value) -> Result<Vec<FieldTest>, AppError> {
    if !is_operator_doc(val) {
        return Ok(vec![FieldTest::Eq(val.clone())]);
    }
    let mut tests = Vec::new();
    for (op, arg) in val.as_object().into_iter().flatten() {
        let test = match op.as_str() {
            "$eq" => FieldTest::Eq(arg.clone()),
            "$ne" => FieldTest::Ne(arg.clone()),
            "$gt" => FieldTest::Cmp(Ordering::Greater, false, arg.clone()),
            "$gte" => FieldTest::Cmp(Ordering::Greater, true, arg.clone()),
            "$lt" => FieldTest::Cmp(Ordering::Less, false, arg.clone()),
            "$lte" => FieldTest::Cmp(Ordering::Less, true, arg.clone()),
            "$in" | "$nin" => {
                let items = arg
                    .as_array()
                    .ok_or_else(|| AppError::malformed(format!("{} expects an array", op)))?
                    .clone();
                if op == "$in" {
                    FieldTest::In(items)
                } else {
                    FieldTest::NotIn(items)
                }
            }
            "$regex" => {
                let pattern = arg
                    .as_str()
                    .ok_or_else(|| AppError::malformed("$regex expects a string"))?;
                FieldTest::Regex(Regex::new(pattern).map_err(|e| AppError::malformed(e.to_string()))?)
            }
            other => return Err(AppError::malformed(format!("unknown operator {}", other))),
        };
        tests.push(test);
    }
    Ok(tests)
}

fn lookup<'a>(record: &'a Record, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut cur = record.get(first)?;
    for seg in rest {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Equality with array-contains: `{tags: "x"}` matches `tags: ["x", "y"]`. Missing matches null.
fn value_eq(field: Option<&Value>, target: &Value) -> bool {
    match field {
        None => target.is_null(),
        Some(Value::Array(items)) if !target.is_array() => items.iter().any(|i| scalar_eq(i, target)),
        Some(v) => scalar_eq(v, target),
    }
}

/// Ordering between values of the same kind; mixed kinds are incomparable.
fn same_kind_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl FieldTest {
    fn accepts(&self, field: Option<&Value>) -> bool {
        match self {
            FieldTest::Eq(target) => value_eq(field, target),
            FieldTest::Ne(target) => !value_eq(field, target),
            FieldTest::Cmp(dir, inclusive, target) => match field.and_then(|v| same_kind_cmp(v, target)) {
                Some(Ordering::Equal) => *inclusive,
                Some(ord) => ord == *dir,
                None => false,
            },
            FieldTest::In(items) => items.iter().any(|t| value_eq(field, t)),
            FieldTest::NotIn(items) => !items.iter().any(|t| value_eq(field, t)),
            // Scalars match on their text form, the way a relational column cast to text does.
            FieldTest::Regex(re) => match field {
                Some(Value::String(s)) => re.is_match(s),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => re.is_match(&v.to_string()),
                _ => false,
            },
        }
    }
}

/// Sort order across kinds: missing/null, booleans, numbers, strings, then everything else.
fn sort_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(_) => 4,
    }
}

fn compare_records(a: &Record, b: &Record, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let (va, vb) = (a.get(&key.field), b.get(&key.field));
        let ord = match (va, vb) {
            (Some(x), Some(y)) => same_kind_cmp(x, y).unwrap_or_else(|| sort_rank(va).cmp(&sort_rank(vb))),
            _ => sort_rank(va).cmp(&sort_rank(vb)),
        };
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[derive(Default)]
struct Collection {
    next_seq: u64,
    rows: Vec<(u64, Record)>,
}

/// Document store; natural order is insertion order.
pub struct DocumentProvider {
    collection: String,
    config: ProviderConfig,
    rows: RwLock<Collection>,
    journal: Option<Journal>,
}

impl DocumentProvider {
    /// A store that lives only as long as the process.
    pub fn new(collection: impl Into<String>, config: ProviderConfig) -> Self {
        DocumentProvider {
            collection: collection.into(),
            config,
            rows: RwLock::new(Collection::default()),
            journal: None,
        }
    }

    /// A store backed by `db`, loaded with whatever the collection already holds.
    pub fn persistent(collection: impl Into<String>, config: ProviderConfig, db: &DocumentDb) -> Result<Self, AppError> {
        let collection = collection.into();
        let journal = db.journal(&collection)?;
        let rows = journal.load()?;
        let next_seq = rows.last().map(|(seq, _)| seq + 1).unwrap_or(0);
        tracing::debug!(collection = %collection, records = rows.len(), "document collection loaded");
        Ok(DocumentProvider {
            collection,
            config,
            rows: RwLock::new(Collection { next_seq, rows }),
            journal: Some(journal),
        })
    }

    fn matcher(&self, criteria: Option<&CriteriaNode>) -> Result<DocumentMatcher, AppError> {
        let filter = DocumentTranslator.translate(criteria)?;
        tracing::debug!(collection = %self.collection, filter = %filter.as_value(), "document filter");
        DocumentMatcher::compile(&filter)
    }

    fn persist(&self, puts: &[(u64, &Record)], deletes: &[u64]) -> Result<(), AppError> {
        match &self.journal {
            Some(journal) if !puts.is_empty() || !deletes.is_empty() => journal.write(puts, deletes),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PersistenceProvider for DocumentProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn add(&self, mut record: Record) -> Result<Record, AppError> {
        assign_pk(&self.config, &mut record)?;
        let pk = record.get(&self.config.primary_key).cloned().unwrap_or(Value::Null);
        let mut coll = self.rows.write().await;
        if coll.rows.iter().any(|(_, r)| r.get(&self.config.primary_key) == Some(&pk)) {
            return Err(AppError::Conflict(format!("{} {} already exists", self.collection, pk)));
        }
        let seq = coll.next_seq;
        self.persist(&[(seq, &record)], &[])?;
        coll.next_seq += 1;
        coll.rows.push((seq, record.clone()));
        Ok(record)
    }

    async fn find(&self, criteria: Option<&CriteriaNode>) -> Result<Option<Record>, AppError> {
        let m = self.matcher(criteria)?;
        let coll = self.rows.read().await;
        Ok(coll.rows.iter().map(|(_, r)| r).find(|r| m.matches(r)).cloned())
    }

    async fn query(&self, criteria: Option<&CriteriaNode>, options: &QueryOptions) -> Result<Vec<Record>, AppError> {
        let m = self.matcher(criteria)?;
        let window = resolve_window(options);
        let coll = self.rows.read().await;
        let mut hits: Vec<&Record> = coll.rows.iter().map(|(_, r)| r).filter(|r| m.matches(r)).collect();
        if !options.sort.is_empty() {
            hits.sort_by(|a, b| compare_records(a, b, &options.sort));
        }
        Ok(hits
            .into_iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, criteria: Option<&CriteriaNode>) -> Result<u64, AppError> {
        let m = self.matcher(criteria)?;
        let coll = self.rows.read().await;
        Ok(coll.rows.iter().filter(|(_, r)| m.matches(r)).count() as u64)
    }

    async fn update(&self, criteria: Option<&CriteriaNode>, partial: Record) -> Result<u64, AppError> {
        let m = self.matcher(criteria)?;
        let partial = strip_pk(&self.config, partial);
        let mut coll = self.rows.write().await;
        let updated: Vec<(usize, Record)> = coll
            .rows
            .iter()
            .enumerate()
            .filter(|(_, (_, r))| m.matches(r))
            .map(|(i, (_, r))| {
                let mut next = r.clone();
                for (k, v) in &partial {
                    next.insert(k.clone(), v.clone());
                }
                (i, next)
            })
            .collect();
        let puts: Vec<(u64, &Record)> = updated.iter().map(|(i, r)| (coll.rows[*i].0, r)).collect();
        self.persist(&puts, &[])?;
        let n = updated.len() as u64;
        for (i, rec) in updated {
            coll.rows[i].1 = rec;
        }
        Ok(n)
    }

    async fn remove(&self, criteria: Option<&CriteriaNode>) -> Result<u64, AppError> {
        let m = self.matcher(criteria)?;
        let mut coll = self.rows.write().await;
        let doomed: Vec<u64> = coll.rows.iter().filter(|(_, r)| m.matches(r)).map(|(seq, _)| *seq).collect();
        self.persist(&[], &doomed)?;
        coll.rows.retain(|(_, r)| !m.matches(r));
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::ComparisonOp;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap_or_default()
    }

    fn matches(filter: Value, record: Value) -> bool {
        DocumentMatcher::compile_value(&filter).unwrap().matches(&rec(record))
    }

    #[test]
    fn matcher_semantics() {
        assert!(matches(json!({}), json!({ "a": 1 })));
        assert!(matches(json!({ "a": 1 }), json!({ "a": 1.0 })));
        assert!(matches(json!({ "profile.emails": "x@y" }), json!({ "profile": { "emails": ["x@y"] } })));
        assert!(!matches(json!({ "a": { "$gt": 1 } }), json!({ "a": "2" })));
        assert!(matches(json!({ "a": { "$gte": 1, "$lt": 3 } }), json!({ "a": 2 })));
        assert!(matches(json!({ "a": { "$nin": [1, 2] } }), json!({ "a": 3 })));
        assert!(matches(json!({ "a": { "$regex": "^jo" } }), json!({ "a": "john" })));
        assert!(!matches(json!({ "a": { "$regex": "^jo" } }), json!({ "a": 5 })));
        assert!(matches(json!({ "a": { "$regex": "1" } }), json!({ "a": 21 })));
        assert!(matches(json!({ "a": { "$regex": "^true$" } }), json!({ "a": true })));
        assert!(!matches(json!({ "a": { "$regex": "1" } }), json!({ "a": [1] })));
        assert!(!matches(json!({ "a": { "$regex": "" } }), json!({})));
        assert!(matches(json!({ "a": { "$ne": 1 } }), json!({ "b": 1 })));
        assert!(matches(json!({ "a": { "$nin": [1] } }), json!({ "a": null })));
        assert!(matches(json!({ "$or": [{ "a": 1 }, { "b": 2 }] }), json!({ "b": 2 })));
        assert!(matches(json!({ "gone": null }), json!({})));
    }

    #[test]
    fn unknown_operators_fail_closed() {
        assert!(DocumentMatcher::compile_value(&json!({ "$where": "1" })).is_err());
        assert!(DocumentMatcher::compile_value(&json!({ "a": { "$exists": true } })).is_err());
    }

    #[tokio::test]
    async fn crud_round() {
        let p = DocumentProvider::new("accounts", ProviderConfig::default());
        let a = p.add(rec(json!({ "uuid": "A1", "status": 1, "name": "ann" }))).await.unwrap();
        assert_eq!(a["uuid"], "A1");
        p.add(rec(json!({ "status": 2, "name": "bob" }))).await.unwrap();
        assert!(matches!(
            p.add(rec(json!({ "uuid": "A1" }))).await,
            Err(AppError::Conflict(_))
        ));

        let status = CriteriaNode::compare(ComparisonOp::Gte, "status", 1);
        assert_eq!(p.count(Some(&status)).await.unwrap(), 2);
        assert_eq!(p.find_by_pk(&json!("A1")).await.unwrap().unwrap()["name"], "ann");

        let n = p
            .update(Some(&CriteriaNode::eq("name", "bob")), rec(json!({ "uuid": "hijack", "status": 5 })))
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert!(p.find_by_pk(&json!("hijack")).await.unwrap().is_none());

        let opts = QueryOptions {
            sort: vec![SortKey { field: "status".into(), descending: true }],
            ..Default::default()
        };
        let sorted = p.query(None, &opts).await.unwrap();
        assert_eq!(sorted[0]["status"], 5);

        assert_eq!(p.remove_by_pk(&json!("A1")).await.unwrap(), 1);
        assert_eq!(p.count(None).await.unwrap(), 1);
    }

    #[test]
    fn filter_nesting_is_bounded() {
        let mut doc = json!({ "a": 1 });
        for _ in 0..MAX_DEPTH {
            doc = json!({ "$and": [doc] });
        }
        assert!(matches!(
            DocumentMatcher::compile_value(&doc),
            Err(AppError::MalformedCriteria(_))
        ));
        let mut shallow = json!({ "a": 1 });
        for _ in 0..MAX_DEPTH - 1 {
            shallow = json!({ "$or": [shallow] });
        }
        assert!(DocumentMatcher::compile_value(&shallow).unwrap().matches(&rec(json!({ "a": 1 }))));
    }

    #[tokio::test]
    async fn persistent_store_reloads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.redb");
        {
            let db = DocumentDb::open(&path).unwrap();
            let p = DocumentProvider::persistent("accounts", ProviderConfig::default(), &db).unwrap();
            for (pk, name) in [("A1", "ann"), ("A2", "bob"), ("A3", "cat")] {
                p.add(rec(json!({ "uuid": pk, "name": name }))).await.unwrap();
            }
            p.update(Some(&CriteriaNode::eq("uuid", "A2")), rec(json!({ "name": "ben" })))
                .await
                .unwrap();
            p.remove_by_pk(&json!("A1")).await.unwrap();
        }
        let db = DocumentDb::open(&path).unwrap();
        let p = DocumentProvider::persistent("accounts", ProviderConfig::default(), &db).unwrap();
        let all = p.query(None, &QueryOptions::default()).await.unwrap();
        let names: Vec<&Value> = all.iter().map(|r| &r["name"]).collect();
        assert_eq!(names, vec!["ben", "cat"]);
        p.add(rec(json!({ "uuid": "A4", "name": "dan" }))).await.unwrap();
        assert_eq!(p.query(None, &QueryOptions::default()).await.unwrap()[2]["uuid"], "A4");
        assert!(matches!(
            p.add(rec(json!({ "uuid": "A3" }))).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn malformed_criteria_has_no_side_effects() {
        let p = DocumentProvider::new("accounts", ProviderConfig::default());
        p.add(rec(json!({ "a": 1 }))).await.unwrap();
        let bad = CriteriaNode::and(vec![]);
        assert!(matches!(p.remove(Some(&bad)).await, Err(AppError::MalformedCriteria(_))));
        assert_eq!(p.count(None).await.unwrap(), 1);
    }
}
