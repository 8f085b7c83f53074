//! Schema synchronization decisions, kept free of any database handle so the
//! table below is testable on its own.
//!
//! The managers feed three facts into [`plan_sync`]: the revision recorded in
//! the bookkeeping table (if any), the newest revision shipped in the script
//! directory (if any), and whether application tables already exist. The
//! resulting [`SyncAction`] is what `sync()` executes.

/// The outcome of a `sync()` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncResult {
    /// The database schema was created (or adopted via stamping).
    Created,
    /// One or more migrations were applied.
    Upgraded,
    /// The schema was already at the latest revision.
    AlreadyUpToDate,
}

/// Where the database stands relative to the migration scripts on disk.
/// Derived on every query, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseStatus {
    /// No migration bookkeeping was found.
    NoInfo,
    /// The bookkeeping table is behind the script directory.
    UpgradeAvailable,
    /// The recorded revision is the head revision.
    UpToDate,
}

/// The action `sync()` will take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SyncAction {
    /// Run the registry DDL, then record every revision as applied.
    CreateAndStamp,
    /// Record every revision as applied without emitting DDL. Used when
    /// tables exist but bookkeeping does not: the existing schema is trusted
    /// to match the registry.
    StampOnly,
    /// Hand over to the migration runner.
    Upgrade,
    /// Nothing to do.
    Nothing,
}

pub(crate) fn plan_sync(
    current: Option<i64>,
    head: Option<i64>,
    tables_exist: bool,
) -> SyncAction {
    match (current, head) {
        (None, _) if tables_exist => SyncAction::StampOnly,
        (None, _) => SyncAction::CreateAndStamp,
        (Some(c), Some(h)) if c == h => SyncAction::Nothing,
        (Some(_), _) => SyncAction::Upgrade,
    }
}

pub(crate) fn compare_to_latest(current: Option<i64>, head: Option<i64>) -> DatabaseStatus {
    match (current, head) {
        (None, _) => DatabaseStatus::NoInfo,
        (Some(c), Some(h)) if c == h => DatabaseStatus::UpToDate,
        (Some(_), _) => DatabaseStatus::UpgradeAvailable,
    }
}
