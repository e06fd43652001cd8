use crate::db::{DbPool, OrmConn};

/// Shared handles cloned into every handler: the sqlx pool carries the
/// migration/audit side, the SeaORM connection carries the entity side.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
}
