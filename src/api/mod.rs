//! REST endpoints
//!
//! The primary API is GraphQL at /graphql. REST covers what does not fit
//! there: health probes and file downloads such as the attendance export.

pub mod exports;
pub mod health;
