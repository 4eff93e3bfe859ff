use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::HasAuditFields;

/// Audit fields bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traceable {
    pub creation_user: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub modification_user: Option<String>,
    pub modification_date: Option<DateTime<Utc>>,
    /// Caller maintains the fields above
    #[serde(default)]
    pub manual_traceability: bool,
}

impl HasAuditFields for Traceable {
    fn creation_user(&self) -> Option<&str> {
        self.creation_user.as_deref()
    }

    fn set_creation_user(&mut self, user: Option<String>) {
        self.creation_user = user;
    }

    fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.creation_date
    }

    fn set_creation_date(&mut self, date: DateTime<Utc>) {
        self.creation_date = Some(date);
    }

    fn modification_user(&self) -> Option<&str> {
        self.modification_user.as_deref()
    }

    fn set_modification_user(&mut self, user: Option<String>) {
        self.modification_user = user;
    }

    fn modification_date(&self) -> Option<DateTime<Utc>> {
        self.modification_date
    }

    fn set_modification_date(&mut self, date: DateTime<Utc>) {
        self.modification_date = Some(date);
    }

    fn is_manual_traceability(&self) -> bool {
        self.manual_traceability
    }
}

/// Why an entity is about to be saved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveAction {
    /// Before persist
    Create,
    /// Before merge
    Update,
}

/// Hook the repository runs immediately before persist or merge
///
/// # Example
///
/// ```rust
/// use acton_persistence::entity::{BeforeSave, SaveAction};
///
/// struct Normalize;
///
/// impl BeforeSave<String> for Normalize {
///     fn before_save(&self, entity: &mut String, _action: SaveAction, _manual: bool) {
///         *entity = entity.trim().to_lowercase();
///     }
/// }
///
/// let mut value = "  MiXeD ".to_string();
/// Normalize.before_save(&mut value, SaveAction::Create, false);
/// assert_eq!(value, "mixed");
/// ```
pub trait BeforeSave<E>: Send + Sync {
    /// Whether `entity` opts out of automatic audit population
    fn manual_traceability(&self, _entity: &E) -> bool {
        false
    }

    /// Prepare `entity` for `action`
    fn before_save(&self, entity: &mut E, action: SaveAction, manual_traceability: bool);
}

/// Hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl<E> BeforeSave<E> for NoopHook {
    fn before_save(&self, _entity: &mut E, _action: SaveAction, _manual_traceability: bool) {}
}

/// Source of the acting user's name
pub trait PrincipalProvider: Send + Sync {
    fn principal(&self) -> Option<String>;
}

impl<F> PrincipalProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn principal(&self) -> Option<String> {
        self()
    }
}

/// Populates audit fields before save
///
/// On create, creation and modification user/date are set to the principal
/// and the current time. On update only the modification pair changes.
/// Entities with manual traceability are left alone.
pub struct TraceableListener<P> {
    principal: P,
}

impl<P: PrincipalProvider> TraceableListener<P> {
    pub fn new(principal: P) -> Self {
        Self { principal }
    }
}

impl<E, P> BeforeSave<E> for TraceableListener<P>
where
    E: HasAuditFields,
    P: PrincipalProvider,
{
    fn manual_traceability(&self, entity: &E) -> bool {
        entity.is_manual_traceability()
    }

    fn before_save(&self, entity: &mut E, action: SaveAction, manual_traceability: bool) {
        if manual_traceability {
            return;
        }
        let now = Utc::now();
        let principal = self.principal.principal();
        match action {
            SaveAction::Create => {
                if principal.is_some() {
                    entity.set_creation_user(principal.clone());
                    entity.set_modification_user(principal);
                }
                entity.set_creation_date(now);
                entity.set_modification_date(now);
            }
            SaveAction::Update => {
                if principal.is_some() {
                    entity.set_modification_user(principal);
                }
                entity.set_modification_date(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener() -> TraceableListener<impl PrincipalProvider> {
        TraceableListener::new(|| Some("auditor".to_string()))
    }

    #[test]
    fn test_create_sets_both_pairs() {
        let mut audit = Traceable::default();
        listener().before_save(&mut audit, SaveAction::Create, false);
        assert_eq!(audit.creation_user.as_deref(), Some("auditor"));
        assert_eq!(audit.modification_user.as_deref(), Some("auditor"));
        assert!(audit.creation_date.is_some());
        assert_eq!(audit.creation_date, audit.modification_date);
    }

    #[test]
    fn test_update_keeps_creation_date() {
        let created = Utc::now() - chrono::Duration::days(3);
        let mut audit = Traceable {
            creation_user: Some("creator".to_string()),
            creation_date: Some(created),
            ..Traceable::default()
        };
        listener().before_save(&mut audit, SaveAction::Update, false);
        assert_eq!(audit.creation_date, Some(created));
        assert_eq!(audit.creation_user.as_deref(), Some("creator"));
        assert_eq!(audit.modification_user.as_deref(), Some("auditor"));
        assert!(audit.modification_date.is_some_and(|d| d > created));
    }

    #[test]
    fn test_manual_traceability_is_respected() {
        let mut audit = Traceable {
            manual_traceability: true,
            ..Traceable::default()
        };
        let hook = listener();
        let manual = hook.manual_traceability(&audit);
        assert!(manual);
        hook.before_save(&mut audit, SaveAction::Create, manual);
        assert!(audit.creation_date.is_none());
        assert!(audit.creation_user.is_none());
    }

    #[test]
    fn test_missing_principal_still_stamps_dates() {
        let hook = TraceableListener::new(|| None::<String>);
        let mut audit = Traceable::default();
        hook.before_save(&mut audit, SaveAction::Create, false);
        assert!(audit.creation_user.is_none());
        assert!(audit.creation_date.is_some());
    }
}
