use std::{collections::HashMap, sync::OnceLock};

/// Global metrics registry used by all components.
static REGISTRY: OnceLock<prometheus_metric_storage::StorageRegistry> = OnceLock::new();

/// Configures the global metrics registry with a common prefix for all metric
/// names and common labels.
///
/// Only the first call has an effect, and only if it happens before any call
/// to [`get_registry`]. Later calls are ignored.
///
/// # Panics
///
/// Panics if the registry configuration is invalid.
pub fn setup_registry_reentrant(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = prometheus::Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = prometheus_metric_storage::StorageRegistry::new(registry);
    REGISTRY.set(storage_registry).ok();
}

/// Get the global instance of the metrics registry.
pub fn get_registry() -> &'static prometheus::Registry {
    get_storage_registry().registry()
}

/// Get the global instance of the metric storage registry.
///
/// If the registry was not configured with [`setup_registry_reentrant`] it gets
/// initialized with a default value so that unit tests don't have to set it up
/// manually.
pub fn get_storage_registry() -> &'static prometheus_metric_storage::StorageRegistry {
    REGISTRY.get_or_init(prometheus_metric_storage::StorageRegistry::default)
}

/// Encodes all metrics of the registry in the prometheus text format.
pub fn encode(registry: &prometheus::Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    prometheus::Encoder::encode(&encoder, &registry.gather(), &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
