//! Stacks - university library circulation service
//!
//! Catalogue, loans, holds, study rooms, the digital repository and library
//! content, exposed through GraphQL at /graphql.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod graphql;
pub mod jobs;
pub mod services;
