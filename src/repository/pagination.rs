use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{internal_error, invalid_argument, DocbaseResult};
use crate::model::{Document, Value};
use crate::query::{OrderBy, OrderDirection, QueryDefinition};
use crate::store::codec;
use crate::store::evaluator;

/// Offset-flavor page request: 1-based page number and positive page size,
/// validated before anything reaches the store.
#[derive(Clone, Debug)]
pub struct PageRequest {
    page: u32,
    limit: u32,
    order_by: Option<OrderBy>,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page,
            limit,
            order_by: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(OrderBy::new(field, direction));
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub(crate) fn validate(&self) -> DocbaseResult<()> {
        if self.page < 1 {
            return Err(invalid_argument("Page numbers are 1-based and positive"));
        }
        if self.limit < 1 {
            return Err(invalid_argument("Page limit must be a positive integer"));
        }
        Ok(())
    }

    pub(crate) fn offset(&self) -> DocbaseResult<u32> {
        u64::from(self.page - 1)
            .checked_mul(u64::from(self.limit))
            .filter(|offset| *offset <= u64::from(u32::MAX))
            .map(|offset| offset as u32)
            .ok_or_else(|| invalid_argument("Page window exceeds the addressable offset range"))
    }
}

/// Page metadata for the offset flavor. `total` counts every record matching
/// the filters regardless of the window; `total_pages` is `ceil(total/limit)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl PageInfo {
    pub(crate) fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Paginated<M> {
    pub data: Vec<M>,
    pub pagination: PageInfo,
}

/// Cursor-flavor page request: page size, optional ordering, and the token
/// handed back with the previous page.
#[derive(Clone, Debug)]
pub struct CursorRequest {
    limit: u32,
    order_by: Option<OrderBy>,
    page_token: Option<PageToken>,
}

impl CursorRequest {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            order_by: None,
            page_token: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some(OrderBy::new(field, direction));
        self
    }

    pub fn after(mut self, token: PageToken) -> Self {
        self.page_token = Some(token);
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn ordering(&self) -> Option<&OrderBy> {
        self.order_by.as_ref()
    }

    pub fn token(&self) -> Option<&PageToken> {
        self.page_token.as_ref()
    }

    pub(crate) fn validate(&self) -> DocbaseResult<()> {
        if self.limit < 1 {
            return Err(invalid_argument("Page limit must be a positive integer"));
        }
        Ok(())
    }
}

/// One keyset page: the items plus the token resuming after them, or `None`
/// once the page came back short of the requested size.
#[derive(Clone, Debug)]
pub struct Page<M> {
    pub items: Vec<M>,
    pub next_page: Option<PageToken>,
}

/// Opaque resume position: URL-safe base64 over a JSON payload describing the
/// query shape it was minted for and the order-key values of the last item.
/// A token replayed against a different collection, filter set, or ordering
/// is rejected as invalid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    /// Accepts a token previously issued by [`Page::next_page`], e.g. one
    /// echoed back by an API client.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize, Deserialize)]
struct TokenPayload {
    collection: String,
    filters: Vec<TokenFilter>,
    order: Option<TokenOrder>,
    cursor: Vec<JsonValue>,
}

#[derive(Serialize, Deserialize, PartialEq)]
struct TokenFilter {
    field: String,
    op: String,
    value: JsonValue,
}

#[derive(Serialize, Deserialize, PartialEq)]
struct TokenOrder {
    field: String,
    descending: bool,
}

/// Issues the token that resumes after `last` for the given query shape.
pub(crate) fn mint_token(
    definition: &QueryDefinition,
    last: &Document,
) -> DocbaseResult<PageToken> {
    let mut cursor = Vec::new();
    if let Some(order) = definition.ordering() {
        let value = evaluator::field_value(last, order.field()).unwrap_or_else(Value::null);
        cursor.push(codec::encode_value(&value)?);
    }
    cursor.push(codec::encode_value(&Value::from_string(last.id()))?);

    let payload = TokenPayload {
        collection: definition.collection_name().to_string(),
        filters: encode_filters(definition)?,
        order: definition.ordering().map(order_shape),
        cursor,
    };
    let bytes = serde_json::to_vec(&payload)
        .map_err(|err| internal_error(format!("Failed to encode page token: {err}")))?;
    Ok(PageToken(URL_SAFE_NO_PAD.encode(bytes)))
}

/// Decodes a token and checks it against the query it is being replayed on;
/// returns the cursor values to bound that query with.
pub(crate) fn cursor_from_token(
    token: &PageToken,
    definition: &QueryDefinition,
) -> DocbaseResult<Vec<Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.as_str())
        .map_err(|_| invalid_argument("Malformed page token"))?;
    let payload: TokenPayload =
        serde_json::from_slice(&bytes).map_err(|_| invalid_argument("Malformed page token"))?;

    if payload.collection != definition.collection_name()
        || payload.filters != encode_filters(definition)?
        || payload.order != definition.ordering().map(order_shape)
    {
        return Err(invalid_argument(
            "Page token was issued for a different query",
        ));
    }

    payload
        .cursor
        .iter()
        .map(codec::decode_value)
        .collect::<DocbaseResult<Vec<_>>>()
}

fn encode_filters(definition: &QueryDefinition) -> DocbaseResult<Vec<TokenFilter>> {
    definition
        .filters()
        .iter()
        .map(|filter| {
            Ok(TokenFilter {
                field: filter.field().to_string(),
                op: filter.operator().as_str().to_string(),
                value: codec::encode_value(filter.value())?,
            })
        })
        .collect()
}

fn order_shape(order: &OrderBy) -> TokenOrder {
    TokenOrder {
        field: order.field().to_string(),
        descending: order.direction() == OrderDirection::Descending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, FilterOperator};
    use std::collections::BTreeMap;

    fn definition() -> QueryDefinition {
        QueryDefinition::collection("tickets")
            .with_filter(Filter::new(
                "status",
                FilterOperator::Equal,
                Value::from_string("open"),
            ))
            .with_order(OrderBy::ascending("priority"))
            .unwrap()
    }

    fn last_document() -> Document {
        let mut fields = BTreeMap::new();
        fields.insert("priority".to_string(), Value::from_integer(7));
        Document::new("ticket-7", fields)
    }

    #[test]
    fn page_info_rounds_up() {
        let info = PageInfo::new(1, 10, 25);
        assert_eq!(info.total_pages, 3);
        assert_eq!(PageInfo::new(1, 10, 0).total_pages, 0);
        assert_eq!(PageInfo::new(1, 10, 30).total_pages, 3);
    }

    #[test]
    fn tokens_round_trip_for_the_same_query() {
        let definition = definition();
        let token = mint_token(&definition, &last_document()).unwrap();
        let cursor = cursor_from_token(&token, &definition).unwrap();
        assert_eq!(
            cursor,
            vec![Value::from_integer(7), Value::from_string("ticket-7")]
        );
    }

    #[test]
    fn tokens_reject_a_different_query_shape() {
        let token = mint_token(&definition(), &last_document()).unwrap();

        let other_collection = QueryDefinition::collection("users")
            .with_order(OrderBy::ascending("priority"))
            .unwrap();
        assert!(cursor_from_token(&token, &other_collection).is_err());

        let other_order = QueryDefinition::collection("tickets")
            .with_filter(Filter::new(
                "status",
                FilterOperator::Equal,
                Value::from_string("open"),
            ))
            .with_order(OrderBy::descending("priority"))
            .unwrap();
        assert!(cursor_from_token(&token, &other_order).is_err());
    }

    #[test]
    fn garbage_tokens_are_invalid() {
        let definition = definition();
        let err = cursor_from_token(&PageToken::new("not base64!"), &definition).unwrap_err();
        assert_eq!(err.code_str(), "docbase/invalid-argument");
    }

    #[test]
    fn window_offsets_are_checked() {
        assert_eq!(PageRequest::new(3, 10).offset().unwrap(), 20);
        assert!(PageRequest::new(u32::MAX, u32::MAX).offset().is_err());
    }
}
