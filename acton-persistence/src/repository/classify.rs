//! Translation of low-level failures into the repository taxonomy
//!
//! Mutating operations run every failure through [`classify_mutation`]:
//!
//! 1. an error that already is a constraint [`RepositoryError`] passes through;
//! 2. a cause chain containing an integrity violation (uniqueness, foreign
//!    key, stale optimistic-lock version) becomes a constraint error carrying
//!    the deepest driver message with newlines removed;
//! 3. anything else becomes a generic mutation error.
//!
//! Reads cannot violate constraints and use [`classify_read`].

use std::error::Error as StdError;
use std::sync::Arc;

use super::error::{RepositoryError, RepositoryOperation};
use crate::session::{DriverError, PersistenceError};

/// Classify a failure of a mutating operation on `entity_name`
pub fn classify_mutation<E>(
    error: E,
    operation: RepositoryOperation,
    entity_name: &str,
) -> RepositoryError
where
    E: StdError + Send + Sync + 'static,
{
    let error: Arc<dyn StdError + Send + Sync> = Arc::new(error);

    if let Some(existing) = error.downcast_ref::<RepositoryError>() {
        if existing.is_constraint() {
            return existing.clone();
        }
    }

    let root: &(dyn StdError + 'static) = &*error;
    if let Some(violation) = integrity_violation(root) {
        let message = driver_message(violation).replace('\n', "");
        return RepositoryError::constraint(operation, message)
            .with_entity(entity_name)
            .with_shared_source(error);
    }

    RepositoryError::mutation(operation, error.to_string())
        .with_entity(entity_name)
        .with_shared_source(error)
}

/// Wrap a failure of a read operation on `entity_name`
pub fn classify_read<E>(error: E, operation: RepositoryOperation, entity_name: &str) -> RepositoryError
where
    E: StdError + Send + Sync + 'static,
{
    RepositoryError::read(operation, error.to_string())
        .with_entity(entity_name)
        .with_source(error)
}

/// First persistence error in the chain that reports an integrity violation
fn integrity_violation<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a PersistenceError> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(persistence) = err.downcast_ref::<PersistenceError>() {
            if persistence.is_integrity_violation() {
                return Some(persistence);
            }
        }
        current = err.source();
    }
    None
}

/// Driver message below `violation`, else the deepest message in its chain
fn driver_message(violation: &PersistenceError) -> String {
    let mut driver = None;
    let mut deepest = None;
    let mut current = violation.source();
    while let Some(err) = current {
        if let Some(d) = err.downcast_ref::<DriverError>() {
            driver = Some(d.message.clone());
        }
        deepest = Some(err);
        current = err.source();
    }
    driver
        .or_else(|| deepest.map(|err| err.to_string()))
        .unwrap_or_else(|| violation.message.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::session::PersistenceErrorKind;

    #[derive(Debug, thiserror::Error)]
    #[error("could not execute statement")]
    struct StatementError(#[source] PersistenceError);

    fn unique_violation() -> PersistenceError {
        PersistenceError::constraint_violation(
            "could not execute statement",
            DriverError::new(
                "23505",
                "ERROR: duplicate key value violates unique constraint \"user_email_key\"\n  Detail: Key (email)=(a@b.c) already exists.",
            ),
        )
    }

    #[test]
    fn test_constraint_passes_through() {
        let original = RepositoryError::constraint(RepositoryOperation::Create, "dup")
            .with_entity("Original");
        let classified = classify_mutation(original, RepositoryOperation::Update, "Other");
        assert_eq!(classified.operation, RepositoryOperation::Create);
        assert_eq!(classified.entity_type.as_deref(), Some("Original"));
        assert_eq!(classified.constraint_message.as_deref(), Some("dup"));
    }

    #[test]
    fn test_violation_uses_driver_message_without_newlines() {
        let classified = classify_mutation(unique_violation(), RepositoryOperation::Create, "User");
        assert_eq!(classified.kind, RepositoryErrorKind::Constraint);
        assert_eq!(classified.entity_type.as_deref(), Some("User"));
        let message = classified.constraint_message.expect("constraint message");
        assert!(!message.contains('\n'));
        assert!(message.starts_with("ERROR: duplicate key value"));
        assert!(message.ends_with("already exists."));
    }

    #[test]
    fn test_violation_found_deeper_in_chain() {
        let wrapped = StatementError(unique_violation());
        let classified = classify_mutation(wrapped, RepositoryOperation::Update, "User");
        assert!(classified.is_constraint());
        assert!(classified
            .source()
            .and_then(|s| s.downcast_ref::<StatementError>())
            .is_some());
    }

    #[test]
    fn test_stale_version_is_constraint() {
        let stale = PersistenceError::optimistic_lock("row was updated by another transaction");
        let classified = classify_mutation(stale, RepositoryOperation::Update, "User");
        assert!(classified.is_constraint());
        assert_eq!(
            classified.constraint_message.as_deref(),
            Some("row was updated by another transaction")
        );
    }

    #[test]
    fn test_other_failures_are_generic() {
        let failure = PersistenceError::new(PersistenceErrorKind::QueryFailed, "syntax error");
        let classified = classify_mutation(failure, RepositoryOperation::Delete, "User");
        assert_eq!(classified.kind, RepositoryErrorKind::Mutation);
        assert_eq!(classified.operation, RepositoryOperation::Delete);
        assert_eq!(classified.entity_type.as_deref(), Some("User"));
        assert!(classified.source().is_some());
    }

    #[test]
    fn test_non_constraint_repository_error_is_rewrapped() {
        let earlier = RepositoryError::mutation(RepositoryOperation::Create, "flush failed");
        let classified = classify_mutation(earlier, RepositoryOperation::Update, "User");
        assert_eq!(classified.kind, RepositoryErrorKind::Mutation);
        assert_eq!(classified.operation, RepositoryOperation::Update);
    }

    #[test]
    fn test_read_classification() {
        let classified = classify_read(
            PersistenceError::connection_failed("refused"),
            RepositoryOperation::FindAll,
            "User",
        );
        assert_eq!(classified.kind, RepositoryErrorKind::Read);
        assert!(classified.is_retriable());
    }
}
