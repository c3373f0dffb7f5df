//! Execution conduit abstraction.
//!
//! A [`Conduit`] is how rendered statements reach the store. Two shapes are
//! supported behind the same pair of traits:
//!
//! - **Transactional**: [`Conduit::begin`] opens a real transaction; a
//!   [`Session`] executes statements inside it and is committed or rolled
//!   back as a whole.
//! - **Process-based**: every statement is dispatched as an independent
//!   invocation. `commit` and `rollback` cannot span statements, and
//!   [`Conduit::is_atomic`] reports `false` so callers can tell.
//!
//! Sessions consume themselves on `commit`/`rollback`. Implementations must
//! also release the unit of work when a session is dropped without either
//! call (rolling back where the backend allows it).

use crate::error::ConduitError;
use crate::statement::Statement;

/// Source of units of work against a store.
pub trait Conduit {
    /// Unit of work returned by [`begin`](Self::begin).
    type Session<'a>: Session
    where
        Self: 'a;

    /// Opens a unit of work.
    ///
    /// # Errors
    ///
    /// Returns a [`ConduitError`] when the store cannot be reached or a
    /// transaction cannot be started.
    fn begin(&mut self) -> Result<Self::Session<'_>, ConduitError>;

    /// Whether statements in one session apply all-or-nothing.
    fn is_atomic(&self) -> bool;
}

/// One unit of work: statements executed in order, then committed or
/// rolled back.
pub trait Session {
    /// Executes a single statement.
    ///
    /// # Errors
    ///
    /// Returns a [`ConduitError`] when the store rejects the statement.
    fn execute(&mut self, statement: &Statement) -> Result<(), ConduitError>;

    /// Makes every executed statement durable.
    ///
    /// # Errors
    ///
    /// Returns a [`ConduitError`] when the store fails to acknowledge the
    /// commit; the outcome of the unit of work is then unknown.
    fn commit(self) -> Result<(), ConduitError>;

    /// Discards every executed statement, where the backend allows it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConduitError`] when the rollback itself fails.
    fn rollback(self) -> Result<(), ConduitError>;
}
