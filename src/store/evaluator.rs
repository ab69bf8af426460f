use std::cmp::Ordering;

use crate::error::{invalid_argument, DocbaseResult};
use crate::model::{Document, Value, ValueKind};
use crate::query::{Filter, FilterOperator, OrderBy, OrderDirection, QueryDefinition};

/// Applies a query definition to candidate documents: conjunctive filters,
/// then ordering (requested key first, id as tiebreak), then the cursor
/// bound, offset, and limit. Queries, counts, and listener re-emission all
/// funnel through here so every read path agrees on semantics.
pub(crate) fn apply_query(
    documents: Vec<Document>,
    definition: &QueryDefinition,
) -> Vec<Document> {
    let mut matching: Vec<Document> = documents
        .into_iter()
        .filter(|document| document_matches(document, definition.filters()))
        .collect();

    matching.sort_by(|left, right| compare_documents(left, right, definition.ordering()));

    if let Some(cursor) = definition.cursor() {
        matching.retain(|document| !at_or_before_cursor(document, cursor, definition.ordering()));
    }

    if let Some(offset) = definition.result_offset() {
        let skip = (offset as usize).min(matching.len());
        matching.drain(0..skip);
    }

    if let Some(limit) = definition.result_limit() {
        matching.truncate(limit as usize);
    }

    matching
}

pub(crate) fn document_matches(document: &Document, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|filter| match field_value(document, filter.field()) {
            Some(value) => evaluate_filter(filter, &value),
            None => match filter.operator() {
                FilterOperator::NotEqual => evaluate_filter(filter, &Value::null()),
                _ => false,
            },
        })
}

/// Malformed filter and cursor shapes reject when the query executes, not
/// when it is built.
pub(crate) fn validate_query(definition: &QueryDefinition) -> DocbaseResult<()> {
    for filter in definition.filters() {
        if filter.value().is_sentinel() {
            return Err(invalid_argument(format!(
                "Filter on '{}' uses a write-only sentinel value",
                filter.field()
            )));
        }
        match filter.operator() {
            FilterOperator::ArrayContainsAny | FilterOperator::In | FilterOperator::NotIn => {
                if !matches!(filter.value().kind(), ValueKind::Array(_)) {
                    return Err(invalid_argument(format!(
                        "Operator '{}' requires an array value",
                        filter.operator().as_str()
                    )));
                }
            }
            _ => {}
        }
    }
    if let Some(cursor) = definition.cursor() {
        let expected = match definition.ordering() {
            Some(_) => 2,
            None => 1,
        };
        if cursor.len() != expected {
            return Err(invalid_argument(
                "Cursor values do not match the query ordering",
            ));
        }
        if cursor.iter().any(Value::is_sentinel) {
            return Err(invalid_argument("Cursor contains a write-only sentinel"));
        }
    }
    Ok(())
}

fn evaluate_filter(filter: &Filter, value: &Value) -> bool {
    match filter.operator() {
        FilterOperator::Equal => value == filter.value(),
        FilterOperator::NotEqual => value != filter.value(),
        FilterOperator::LessThan => compare_values(value, filter.value()) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare_values(value, filter.value()),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::GreaterThan => {
            compare_values(value, filter.value()) == Some(Ordering::Greater)
        }
        FilterOperator::GreaterThanOrEqual => matches!(
            compare_values(value, filter.value()),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::ArrayContains => match value.kind() {
            ValueKind::Array(array) => array.iter().any(|candidate| candidate == filter.value()),
            _ => false,
        },
        FilterOperator::ArrayContainsAny => match (value.kind(), filter.value().kind()) {
            (ValueKind::Array(array), ValueKind::Array(needles)) => needles
                .iter()
                .any(|needle| array.iter().any(|candidate| candidate == needle)),
            _ => false,
        },
        FilterOperator::In => match filter.value().kind() {
            ValueKind::Array(values) => values.iter().any(|needle| needle == value),
            _ => false,
        },
        FilterOperator::NotIn => match filter.value().kind() {
            ValueKind::Array(values) => {
                !matches!(value.kind(), ValueKind::Null)
                    && values.iter().all(|needle| needle != value)
            }
            _ => false,
        },
    }
}

/// Looks a dotted path up inside the document's field map. Only map kinds are
/// descended into; a path running through any other kind resolves to nothing.
pub(crate) fn field_value(document: &Document, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        match current.kind() {
            ValueKind::Map(child) => current = child.get(segment)?,
            _ => return None,
        }
    }
    Some(current.clone())
}

/// Total order over documents: the requested key first, the id as tiebreak.
/// The tiebreak runs in the same direction as the requested key so cursor
/// bounds stay monotone.
pub(crate) fn compare_documents(
    left: &Document,
    right: &Document,
    ordering: Option<&OrderBy>,
) -> Ordering {
    let direction = match ordering {
        Some(order) => {
            let left_value = field_value(left, order.field()).unwrap_or_else(Value::null);
            let right_value = field_value(right, order.field()).unwrap_or_else(Value::null);
            let mut result = compare_values(&left_value, &right_value).unwrap_or(Ordering::Equal);
            if order.direction() == OrderDirection::Descending {
                result = result.reverse();
            }
            if result != Ordering::Equal {
                return result;
            }
            order.direction()
        }
        None => OrderDirection::Ascending,
    };

    let ids = left.id().cmp(right.id());
    if direction == OrderDirection::Descending {
        ids.reverse()
    } else {
        ids
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left.kind(), right.kind()) {
        (ValueKind::Null, ValueKind::Null) => Some(Ordering::Equal),
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Some(a.cmp(b)),
        (ValueKind::Integer(a), ValueKind::Integer(b)) => Some(a.cmp(b)),
        (ValueKind::Double(a), ValueKind::Double(b)) => a.partial_cmp(b),
        (ValueKind::Integer(a), ValueKind::Double(b)) => (*a as f64).partial_cmp(b),
        (ValueKind::Double(a), ValueKind::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => Some(a.cmp(b)),
        (ValueKind::String(a), ValueKind::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Position of `document` relative to an exclusive start-after cursor. The
/// cursor carries the order-key value (when the query orders) followed by the
/// id of the last document already delivered.
fn at_or_before_cursor(document: &Document, cursor: &[Value], ordering: Option<&OrderBy>) -> bool {
    let mut index = 0;
    if let Some(order) = ordering {
        let Some(bound) = cursor.get(index) else {
            return false;
        };
        let value = field_value(document, order.field()).unwrap_or_else(Value::null);
        let mut result = compare_values(&value, bound).unwrap_or(Ordering::Equal);
        if order.direction() == OrderDirection::Descending {
            result = result.reverse();
        }
        match result {
            Ordering::Less => return true,
            Ordering::Greater => return false,
            Ordering::Equal => {}
        }
        index += 1;
    }

    let Some(ValueKind::String(bound_id)) = cursor.get(index).map(Value::kind) else {
        return false;
    };
    let mut ids = document.id().cmp(bound_id.as_str());
    if let Some(order) = ordering {
        if order.direction() == OrderDirection::Descending {
            ids = ids.reverse();
        }
    }
    ids != Ordering::Greater
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ticket(id: &str, status: &str, priority: i64) -> Document {
        let mut fields = BTreeMap::new();
        fields.insert("status".to_string(), Value::from_string(status));
        fields.insert("priority".to_string(), Value::from_integer(priority));
        Document::new(id, fields)
    }

    #[test]
    fn filters_conjunctively() {
        let filters = vec![
            Filter::new("status", FilterOperator::Equal, Value::from_string("open")),
            Filter::new(
                "priority",
                FilterOperator::GreaterThanOrEqual,
                Value::from_integer(2),
            ),
        ];
        assert!(document_matches(&ticket("a", "open", 3), &filters));
        assert!(!document_matches(&ticket("b", "open", 1), &filters));
        assert!(!document_matches(&ticket("c", "closed", 3), &filters));
    }

    #[test]
    fn applies_ordering_and_limit() {
        let definition = QueryDefinition::collection("tickets")
            .with_order(OrderBy::ascending("priority"))
            .unwrap()
            .with_limit(2)
            .unwrap();

        let docs = vec![
            ticket("sf", "open", 100),
            ticket("nyc", "open", 50),
            ticket("la", "open", 75),
        ];

        let result = apply_query(docs, &definition);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id(), "nyc");
        assert_eq!(result[1].id(), "la");
    }

    #[test]
    fn id_breaks_ties() {
        let definition = QueryDefinition::collection("tickets")
            .with_order(OrderBy::ascending("priority"))
            .unwrap();
        let docs = vec![ticket("b", "open", 1), ticket("a", "open", 1)];
        let result = apply_query(docs, &definition);
        assert_eq!(result[0].id(), "a");
        assert_eq!(result[1].id(), "b");
    }

    #[test]
    fn offset_skips_from_the_front() {
        let definition = QueryDefinition::collection("tickets").with_offset(2);
        let docs = vec![
            ticket("a", "open", 1),
            ticket("b", "open", 2),
            ticket("c", "open", 3),
        ];
        let result = apply_query(docs, &definition);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id(), "c");
    }

    #[test]
    fn cursor_is_exclusive() {
        let definition = QueryDefinition::collection("tickets")
            .with_order(OrderBy::ascending("priority"))
            .unwrap()
            .starting_after(vec![Value::from_integer(2), Value::from_string("b")]);
        let docs = vec![
            ticket("a", "open", 1),
            ticket("b", "open", 2),
            ticket("c", "open", 3),
        ];
        let result = apply_query(docs, &definition);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id(), "c");
    }

    #[test]
    fn membership_operators() {
        let filter = Filter::new(
            "status",
            FilterOperator::In,
            Value::from_array(vec![
                Value::from_string("open"),
                Value::from_string("triaged"),
            ]),
        );
        assert!(document_matches(&ticket("a", "triaged", 1), &[filter.clone()]));
        assert!(!document_matches(&ticket("b", "closed", 1), &[filter]));
    }

    #[test]
    fn malformed_membership_filter_is_rejected_at_execution() {
        let definition = QueryDefinition::collection("tickets").with_filter(Filter::new(
            "status",
            FilterOperator::In,
            Value::from_string("open"),
        ));
        assert!(validate_query(&definition).is_err());
    }
}
