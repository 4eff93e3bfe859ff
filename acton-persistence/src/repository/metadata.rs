//! Entity registration: names and eager-loading graph names

use crate::config::PersistenceConfig;
use crate::query::TypeKey;

/// Static registration of an entity type with a repository
///
/// The name defaults to the unqualified type name. Eager-loading graph names
/// default to the entity name followed by the configured suffixes
/// (`User.loadAll`, `User.loadByGuid`).
///
/// # Example
///
/// ```rust
/// use acton_persistence::repository::EntityMetadata;
///
/// mod model { pub struct Customer; }
///
/// let metadata = EntityMetadata::of::<model::Customer>();
/// assert_eq!(metadata.name(), "Customer");
/// assert_eq!(metadata.load_all_graph(), "Customer.loadAll");
///
/// let renamed = EntityMetadata::of::<model::Customer>().with_name("Client");
/// assert_eq!(renamed.load_by_id_graph(), "Client.loadByGuid");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    entity: TypeKey,
    name: String,
    load_all_suffix: String,
    load_by_id_suffix: String,
    load_all_graph: Option<String>,
    load_by_id_graph: Option<String>,
}

impl EntityMetadata {
    /// Metadata for `E` with default name and graph suffixes
    pub fn of<E: 'static>() -> Self {
        let entity = TypeKey::of::<E>();
        let defaults = PersistenceConfig::default();
        Self {
            entity,
            name: entity.short_name().to_string(),
            load_all_suffix: defaults.load_all_graph_suffix,
            load_by_id_suffix: defaults.load_by_id_graph_suffix,
            load_all_graph: None,
            load_by_id_graph: None,
        }
    }

    /// Override the entity name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Take graph suffixes from configuration
    #[must_use]
    pub fn with_config(mut self, config: &PersistenceConfig) -> Self {
        self.load_all_suffix = config.load_all_graph_suffix.clone();
        self.load_by_id_suffix = config.load_by_id_graph_suffix.clone();
        self
    }

    /// Use an explicit graph name for `load_all`
    #[must_use]
    pub fn with_load_all_graph(mut self, graph: impl Into<String>) -> Self {
        self.load_all_graph = Some(graph.into());
        self
    }

    /// Use an explicit graph name for `load_by_id` / `load_by_ids`
    #[must_use]
    pub fn with_load_by_id_graph(mut self, graph: impl Into<String>) -> Self {
        self.load_by_id_graph = Some(graph.into());
        self
    }

    pub fn entity(&self) -> TypeKey {
        self.entity
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn load_all_graph(&self) -> String {
        self.load_all_graph
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.name, self.load_all_suffix))
    }

    pub fn load_by_id_graph(&self) -> String {
        self.load_by_id_graph
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.name, self.load_by_id_suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Invoice;

    #[test]
    fn test_defaults() {
        let metadata = EntityMetadata::of::<Invoice>();
        assert_eq!(metadata.name(), "Invoice");
        assert_eq!(metadata.entity(), TypeKey::of::<Invoice>());
        assert_eq!(metadata.load_all_graph(), "Invoice.loadAll");
        assert_eq!(metadata.load_by_id_graph(), "Invoice.loadByGuid");
    }

    #[test]
    fn test_configured_suffixes() {
        let config = PersistenceConfig {
            load_all_graph_suffix: ".all".to_string(),
            load_by_id_graph_suffix: ".one".to_string(),
            ..PersistenceConfig::default()
        };
        let metadata = EntityMetadata::of::<Invoice>()
            .with_name("Bill")
            .with_config(&config);
        assert_eq!(metadata.load_all_graph(), "Bill.all");
        assert_eq!(metadata.load_by_id_graph(), "Bill.one");
    }

    #[test]
    fn test_explicit_graphs_win() {
        let metadata = EntityMetadata::of::<Invoice>()
            .with_load_all_graph("invoice-with-lines")
            .with_name("Ignored");
        assert_eq!(metadata.load_all_graph(), "invoice-with-lines");
        assert_eq!(metadata.load_by_id_graph(), "Ignored.loadByGuid");
    }
}
