//! Process-wide handle to the open [`Database`](crate::database::Database),
//! set once by a CLI entry point and read everywhere else that doesn't
//! want to thread a `&Database` through every call. Mirrors the
//! teacher's own `Unique` singleton shape, scoped to the handles this
//! crate's binaries actually share.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::buffer_pool::BufferPool;
use crate::database::Database;
use crate::dictionary::Dictionary;
use crate::differential::DifferentialIndex;
use crate::facts::FactsStore;

static DATABASE: OnceCell<Arc<Database>> = OnceCell::new();

pub struct Unique;

impl Unique {
    /// Install the process-wide database handle. Panics if called more
    /// than once in the same process.
    pub fn init(db: Database) {
        DATABASE
            .set(Arc::new(db))
            .unwrap_or_else(|_| panic!("database already initialized"));
    }

    pub fn database() -> Arc<Database> {
        DATABASE.get().expect("database not initialized").clone()
    }

    pub fn buffer_pool() -> Arc<BufferPool> {
        Self::database().pool()
    }

    pub fn dictionary() -> Arc<Dictionary> {
        Self::database().dictionary()
    }

    pub fn facts() -> Arc<FactsStore> {
        Self::database().facts()
    }

    pub fn differential() -> Arc<DifferentialIndex> {
        Self::database().differential()
    }
}
