//! Edge write helpers
//!
//! Edges are set-membership facts: services check for an existing row before
//! inserting, and deletes remove every matching row. The helper below absorbs
//! the rare concurrent-insert race so idempotent toggles never surface a
//! transient conflict to the caller.

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ConnectionTrait, EntityTrait, IntoActiveModel, SqlErr,
};
use tracing::debug;

use crate::shared::Result;

/// Insert an edge row, treating a concurrent duplicate insert as success
pub(crate) async fn insert_edge<C, A>(conn: &C, edge: A) -> Result<()>
where
    C: ConnectionTrait,
    A: ActiveModelTrait + ActiveModelBehavior + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    match edge.insert(conn).await {
        Ok(_) => Ok(()),
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            debug!("edge already present after concurrent insert");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
