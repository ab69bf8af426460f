use crate::error::{invalid_argument, DocbaseResult};
use crate::model::Value;

/// Relational, array, and membership operators a filter can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    Equal,
    NotEqual,
    GreaterThanOrEqual,
    GreaterThan,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::ArrayContains => "array-contains",
            FilterOperator::ArrayContainsAny => "array-contains-any",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not-in",
        }
    }
}

/// One field/operator/value predicate. Filters on the same query combine
/// conjunctively; their order never changes the result.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    field: String,
    operator: FilterOperator,
    value: Value,
}

impl Filter {
    /// `field` may be a dotted path reaching into nested maps.
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    field: String,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(field: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self::new(field, OrderDirection::Ascending)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::new(field, OrderDirection::Descending)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// Optional ordering and result-count cap for bulk reads. At most one
/// ordering key; the limit must be positive when present (checked when the
/// query is built, before anything reaches the store).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    order_by: Option<OrderBy>,
    limit: Option<u32>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(OrderBy::new(field, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn result_limit(&self) -> Option<u32> {
        self.limit
    }
}

/// The store-executable form of a query: a collection scan narrowed by
/// conjunctive filters, then ordered, then windowed.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDefinition {
    collection: String,
    filters: Vec<Filter>,
    order_by: Option<OrderBy>,
    limit: Option<u32>,
    offset: Option<u32>,
    start_after: Option<Vec<Value>>,
}

impl QueryDefinition {
    /// Starts from the full collection; constraints are layered on from here.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
            start_after: None,
        }
    }

    /// Builds the definition the way callers hand queries to a repository:
    /// every filter in order, then the optional ordering, then the optional
    /// limit.
    pub fn from_options(
        collection: impl Into<String>,
        filters: Vec<Filter>,
        options: &QueryOptions,
    ) -> DocbaseResult<Self> {
        let mut definition = Self::collection(collection);
        for filter in filters {
            definition = definition.with_filter(filter);
        }
        if let Some(order) = options.ordering() {
            definition = definition.with_order(order.clone())?;
        }
        if let Some(limit) = options.result_limit() {
            definition = definition.with_limit(limit)?;
        }
        Ok(definition)
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// At most one ordering key per query.
    pub fn with_order(mut self, order: OrderBy) -> DocbaseResult<Self> {
        if self.order_by.is_some() {
            return Err(invalid_argument(
                "Queries support at most one ordering field",
            ));
        }
        self.order_by = Some(order);
        Ok(self)
    }

    pub fn with_limit(mut self, limit: u32) -> DocbaseResult<Self> {
        if limit == 0 {
            return Err(invalid_argument("Query limit must be a positive integer"));
        }
        self.limit = Some(limit);
        Ok(self)
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Exclusive cursor bound: order-key values (ordering field first, id
    /// last) of the last document already seen.
    pub fn starting_after(mut self, cursor: Vec<Value>) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn result_limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn result_offset(&self) -> Option<u32> {
        self.offset
    }

    pub fn cursor(&self) -> Option<&[Value]> {
        self.start_after.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_in_constraint_order() {
        let options = QueryOptions::new()
            .order_by("priority", OrderDirection::Descending)
            .limit(5);
        let definition = QueryDefinition::from_options(
            "tickets",
            vec![Filter::new(
                "status",
                FilterOperator::Equal,
                Value::from_string("open"),
            )],
            &options,
        )
        .unwrap();

        assert_eq!(definition.collection_name(), "tickets");
        assert_eq!(definition.filters().len(), 1);
        assert_eq!(definition.ordering().unwrap().field(), "priority");
        assert_eq!(definition.result_limit(), Some(5));
    }

    #[test]
    fn rejects_zero_limit() {
        let options = QueryOptions::new().limit(0);
        let result = QueryDefinition::from_options("tickets", Vec::new(), &options);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_second_ordering() {
        let definition = QueryDefinition::collection("tickets")
            .with_order(OrderBy::ascending("priority"))
            .unwrap();
        assert!(definition.with_order(OrderBy::ascending("status")).is_err());
    }
}
