//! Offset cursors for paged catalogue listings
//!
//! Cursors are opaque to clients: an offset wrapped in URL-safe base64.
//! Use `define_connection!` to declare the GraphQL connection for a node type.

use async_graphql::SimpleObject;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::services::{ServiceError, ServiceResult};

const CURSOR_PREFIX: &str = "offset:";
const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(SimpleObject, Debug, Clone, Default)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    /// Items matching the query across all pages
    pub total_count: i64,
}

/// One page of nodes with their cursors, before it is wrapped in a
/// concrete connection type
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub nodes: Vec<(String, T)>,
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, offset: i64, total: i64) -> Self {
        let count = items.len() as i64;
        let nodes: Vec<(String, T)> = items
            .into_iter()
            .enumerate()
            .map(|(i, node)| (encode_cursor(offset + i as i64), node))
            .collect();

        let page_info = PageInfo {
            has_next_page: offset + count < total,
            has_previous_page: offset > 0,
            start_cursor: nodes.first().map(|(c, _)| c.clone()),
            end_cursor: nodes.last().map(|(c, _)| c.clone()),
            total_count: total,
        };

        Self { nodes, page_info }
    }
}

/// Declare a connection and edge type for a node
///
/// ```ignore
/// define_connection!(BookConnection, BookEdge, Book);
/// ```
#[macro_export]
macro_rules! define_connection {
    ($conn_name:ident, $edge_name:ident, $node_type:ty) => {
        #[derive(async_graphql::SimpleObject, Debug, Clone)]
        pub struct $edge_name {
            pub node: $node_type,
            pub cursor: String,
        }

        #[derive(async_graphql::SimpleObject, Debug, Clone)]
        pub struct $conn_name {
            pub edges: Vec<$edge_name>,
            pub page_info: $crate::graphql::pagination::PageInfo,
        }

        impl $conn_name {
            pub fn from_page<T: Into<$node_type>>(page: $crate::graphql::pagination::Page<T>) -> Self {
                Self {
                    edges: page
                        .nodes
                        .into_iter()
                        .map(|(cursor, node)| $edge_name {
                            node: node.into(),
                            cursor,
                        })
                        .collect(),
                    page_info: page.page_info,
                }
            }
        }
    };
}

pub fn encode_cursor(offset: i64) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}{}", CURSOR_PREFIX, offset))
}

pub fn decode_cursor(cursor: &str) -> ServiceResult<i64> {
    let invalid = || ServiceError::validation("Invalid cursor");
    let decoded = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(decoded).map_err(|_| invalid())?;
    text.strip_prefix(CURSOR_PREFIX)
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .ok_or_else(invalid)
}

/// `(offset, limit)` for a `first`/`after` pair
pub fn page_args(first: Option<i32>, after: Option<&str>) -> ServiceResult<(i64, i64)> {
    let limit = first
        .map(i64::from)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = match after {
        Some(cursor) => decode_cursor(cursor)? + 1,
        None => 0,
    };
    Ok((offset, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_page_args_defaults_and_caps() {
        assert_eq!(page_args(None, None).unwrap(), (0, 20));
        assert_eq!(page_args(Some(500), None).unwrap(), (0, 100));
        assert_eq!(page_args(Some(0), None).unwrap(), (0, 1));
    }

    #[test]
    fn test_page_args_resume_after_cursor() {
        let cursor = encode_cursor(9);
        assert_eq!(page_args(Some(10), Some(&cursor)).unwrap(), (10, 10));
    }

    #[test]
    fn test_garbage_cursor_is_rejected() {
        assert_matches!(decode_cursor("not base64!"), Err(ServiceError::Validation(_)));
        let wrong_prefix = URL_SAFE_NO_PAD.encode("page:3");
        assert_matches!(decode_cursor(&wrong_prefix), Err(ServiceError::Validation(_)));
    }

    #[test]
    fn test_page_info_edges() {
        let page = Page::new(vec!["a", "b"], 2, 5);
        assert!(page.page_info.has_next_page);
        assert!(page.page_info.has_previous_page);
        assert_eq!(page.page_info.start_cursor, Some(encode_cursor(2)));
        assert_eq!(page.page_info.end_cursor, Some(encode_cursor(3)));

        let last = Page::new(vec!["e"], 4, 5);
        assert!(!last.page_info.has_next_page);
    }
}
