//! Unit of Work implementation
//!
//! Provides a transactional scope for multi-repository operations, plus the
//! post-commit hooks the change notifier defers its events to.

use spacemarine_notify::{CommitHook, CommitHooks, CommitScope};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::Result;

/// Unit of Work for managing database transactions
///
/// Hooks registered through [`CommitScope`] run only after the transaction
/// has committed. Rolling back, or dropping the unit of work without
/// committing, discards them.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
    hooks: CommitHooks,
}

impl UnitOfWork {
    /// Begin a new transaction
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx,
            hooks: CommitHooks::new(),
        })
    }

    /// Connection to run repository operations on
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Commit the transaction, then run the deferred hooks in order
    pub async fn commit(self) -> Result<()> {
        let Self { tx, hooks } = self;
        tx.commit().await?;
        hooks.run_all();
        Ok(())
    }

    /// Commit without converting the error, for callers that need to tell
    /// a refused commit from a lost connection
    pub async fn commit_raw(self) -> std::result::Result<(), sqlx::Error> {
        let Self { tx, hooks } = self;
        tx.commit().await?;
        hooks.run_all();
        Ok(())
    }

    /// Roll back the transaction and drop every deferred hook
    pub async fn rollback(self) -> Result<()> {
        let Self { tx, hooks } = self;
        drop(hooks);
        tx.rollback().await?;
        Ok(())
    }

    /// Number of hooks waiting for commit
    #[must_use]
    pub fn pending_hooks(&self) -> usize {
        self.hooks.len()
    }
}

impl CommitScope for UnitOfWork {
    fn transaction_active(&self) -> bool {
        true
    }

    fn on_after_commit(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("pending_hooks", &self.hooks.len())
            .finish()
    }
}
