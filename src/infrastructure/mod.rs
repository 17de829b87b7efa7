//! Infrastructure: the database and the external collaborators
//!
//! Everything here is constructed explicitly and injected into the
//! services, so tests substitute fakes at the trait seams.

pub mod auth;
pub mod completion;
pub mod database;
pub mod places;
pub mod storage;
