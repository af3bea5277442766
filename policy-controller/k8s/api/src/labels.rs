use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use thiserror::Error;

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Expression {
    pub key: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of namespaces by their labels.
///
/// All `matchLabels` entries and all `matchExpressions` must match; an empty
/// selector matches everything.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    match_labels: Option<Map>,
    match_expressions: Option<Expressions>,
}

/// A selector that can be deserialized but can never be evaluated.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("values must be non-empty for operator {operator:?} on key {key:?}")]
    MissingValues { key: String, operator: Operator },

    #[error("values must be empty for operator {operator:?} on key {key:?}")]
    UnexpectedValues { key: String, operator: Operator },

    #[error("label key must not be empty")]
    EmptyKey,
}

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// Checks that every expression is well-formed.
    pub fn validate(&self) -> Result<(), SelectorError> {
        if self.match_labels.iter().flatten().any(|(k, _)| k.is_empty()) {
            return Err(SelectorError::EmptyKey);
        }

        for expr in self.match_expressions.iter().flatten() {
            expr.validate()?;
        }

        Ok(())
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels.as_ref()) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.0.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Labels ===

impl Labels {
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new(key: impl Into<String>, operator: Operator, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn validate(&self) -> Result<(), SelectorError> {
        if self.key.is_empty() {
            return Err(SelectorError::EmptyKey);
        }

        match self.operator {
            Operator::In | Operator::NotIn if self.values.is_empty() => {
                Err(SelectorError::MissingValues {
                    key: self.key.clone(),
                    operator: self.operator,
                })
            }
            Operator::Exists | Operator::DoesNotExist if !self.values.is_empty() => {
                Err(SelectorError::UnexpectedValues {
                    key: self.key.clone(),
                    operator: self.operator,
                })
            }
            _ => Ok(()),
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .map_or(false, |v| self.values.contains(v)),
            Operator::NotIn => labels
                .get(&self.key)
                .map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Labels::default(), true, "empty match"),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "bar"))),
                true,
                "exact label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "baz"))),
                false,
                "label value mismatch",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::In, &["bar"]))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "expression match",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::In, &["bar"]))),
                Labels::default(),
                false,
                "in requires the key",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, &["bar"]))),
                Labels::default(),
                true,
                "not-in matches a missing key",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, &["bar"]))),
                Labels::from_iter(Some(("foo", "bar"))),
                false,
                "not-in rejects a listed value",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, &["bar"]))),
                Labels::from_iter(Some(("foo", "qux"))),
                true,
                "not-in accepts an unlisted value",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::Exists, &[]))),
                Labels::from_iter(Some(("foo", ""))),
                true,
                "exists",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::DoesNotExist, &[]))),
                Labels::from_iter(Some(("foo", "bar"))),
                false,
                "does not exist",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn match_labels_and_expressions_are_anded() {
        let selector: Selector = serde_json::from_value(serde_json::json!({
            "matchLabels": { "tenant": "true" },
            "matchExpressions": [{ "key": "env", "operator": "In", "values": ["prod"] }],
        }))
        .unwrap();

        let labels = Labels::from(maplit::btreemap! {
            "tenant".to_string() => "true".to_string(),
            "env".to_string() => "prod".to_string(),
        });
        assert!(selector.matches(&labels));

        let labels = Labels::from(maplit::btreemap! {
            "env".to_string() => "prod".to_string(),
        });
        assert!(!selector.matches(&labels));
    }

    #[test]
    fn validate_operator_values() {
        let selector = Selector::from_iter(Some(Expression::new("foo", Operator::In, &[])));
        assert_eq!(
            selector.validate(),
            Err(SelectorError::MissingValues {
                key: "foo".to_string(),
                operator: Operator::In,
            })
        );

        let selector = Selector::from_iter(Some(Expression::new("foo", Operator::Exists, &["x"])));
        assert_eq!(
            selector.validate(),
            Err(SelectorError::UnexpectedValues {
                key: "foo".to_string(),
                operator: Operator::Exists,
            })
        );

        let selector = Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, &["x"])));
        assert_eq!(selector.validate(), Ok(()));
    }

    #[test]
    fn unknown_operator_fails_to_parse() {
        let res = serde_json::from_value::<Selector>(serde_json::json!({
            "matchExpressions": [{ "key": "env", "operator": "Gt", "values": ["1"] }],
        }));
        assert!(res.is_err());
    }
}
