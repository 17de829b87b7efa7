//! Domain operations, one module per aggregate

pub mod bot;
pub mod diaries;
pub(crate) mod edges;
pub mod maps;
pub mod query;
pub mod restaurants;
pub mod users;
