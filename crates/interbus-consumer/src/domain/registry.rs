//! Explicit name-to-type registry of bus events.
//!
//! Each encoding has its own namespace of keys:
//! - serialized events by the `event_class` header
//! - generic events by `<namespace>.<StudlyName>` derived from the `event` header
//! - protobuf events by the `event` header (protobuf full name)
//!
//! The registry is built once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::event::{BusEvent, DynamicEvent};
use super::payload::TargetKind;

pub type FactoryResult = Result<Box<dyn BusEvent>, serde_json::Error>;

/// Builds an event from a decoded field map.
pub type EventFactory = Arc<dyn Fn(Map<String, Value>) -> FactoryResult + Send + Sync>;

/// Names to register as [`DynamicEvent`]s, as loaded from a registry file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDescriptor {
    #[serde(default)]
    pub serialized: Vec<String>,
    /// Raw generic event names; they are qualified on registration.
    #[serde(default)]
    pub generic: Vec<String>,
    #[serde(default, alias = "protos")]
    pub protobuf: Vec<String>,
}

#[derive(Clone)]
pub struct EventRegistry {
    generic_namespace: String,
    serialized: HashMap<String, EventFactory>,
    generic: HashMap<String, EventFactory>,
    protobuf: HashMap<String, EventFactory>,
}

impl EventRegistry {
    pub fn new(generic_namespace: impl Into<String>) -> Self {
        Self {
            generic_namespace: generic_namespace.into(),
            serialized: HashMap::new(),
            generic: HashMap::new(),
            protobuf: HashMap::new(),
        }
    }

    /// Registry with a [`DynamicEvent`] for every name in the descriptor.
    pub fn from_descriptor(generic_namespace: impl Into<String>, descriptor: &RegistryDescriptor) -> Self {
        let mut registry = Self::new(generic_namespace);
        for class in &descriptor.serialized {
            registry.register_dynamic(TargetKind::Serialized, class);
        }
        for name in &descriptor.generic {
            registry.register_dynamic(TargetKind::Generic, name);
        }
        for name in &descriptor.protobuf {
            registry.register_dynamic(TargetKind::Protobuf, name);
        }
        registry
    }

    /// Register a serde-deserializable event type under `name`.
    pub fn register<E>(&mut self, kind: TargetKind, name: &str) -> &mut Self
    where
        E: BusEvent + DeserializeOwned,
    {
        let factory: EventFactory = Arc::new(|fields: Map<String, Value>| -> FactoryResult {
            let event: E = serde_json::from_value(Value::Object(fields))?;
            Ok(Box::new(event) as Box<dyn BusEvent>)
        });
        self.register_factory(kind, name, factory)
    }

    /// Register a [`DynamicEvent`] under `name`.
    pub fn register_dynamic(&mut self, kind: TargetKind, name: &str) -> &mut Self {
        let key = self.key_for(kind, name);
        let factory: EventFactory = Arc::new(move |fields: Map<String, Value>| -> FactoryResult {
            Ok(Box::new(DynamicEvent::new(key.clone(), fields)) as Box<dyn BusEvent>)
        });
        self.register_factory(kind, name, factory)
    }

    /// Register a custom factory. Unrecognized-kind registrations are ignored.
    pub fn register_factory(&mut self, kind: TargetKind, name: &str, factory: EventFactory) -> &mut Self {
        let key = self.key_for(kind, name);
        if let Some(table) = self.table_mut(kind) {
            table.insert(key, factory);
        }
        self
    }

    /// Registry key of a generic event name.
    pub fn generic_key(&self, event_name: &str) -> String {
        let namespace = self.generic_namespace.trim_end_matches('.');
        let name = studly_case(event_name);
        if namespace.is_empty() {
            name
        } else {
            format!("{namespace}.{name}")
        }
    }

    pub fn factory(&self, kind: TargetKind, key: &str) -> Option<&EventFactory> {
        match kind {
            TargetKind::Serialized => self.serialized.get(key),
            TargetKind::Generic => self.generic.get(key),
            TargetKind::Protobuf => self.protobuf.get(key),
            TargetKind::Unrecognized => None,
        }
    }

    pub fn contains(&self, kind: TargetKind, key: &str) -> bool {
        self.factory(kind, key).is_some()
    }

    /// Number of registered types across all namespaces.
    pub fn len(&self) -> usize {
        self.serialized.len() + self.generic.len() + self.protobuf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key_for(&self, kind: TargetKind, name: &str) -> String {
        match kind {
            TargetKind::Generic => self.generic_key(name),
            _ => name.to_string(),
        }
    }

    fn table_mut(&mut self, kind: TargetKind) -> Option<&mut HashMap<String, EventFactory>> {
        match kind {
            TargetKind::Serialized => Some(&mut self.serialized),
            TargetKind::Generic => Some(&mut self.generic),
            TargetKind::Protobuf => Some(&mut self.protobuf),
            TargetKind::Unrecognized => None,
        }
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = |table: &HashMap<String, EventFactory>| {
            let mut keys: Vec<_> = table.keys().cloned().collect();
            keys.sort();
            keys
        };
        f.debug_struct("EventRegistry")
            .field("generic_namespace", &self.generic_namespace)
            .field("serialized", &keys(&self.serialized))
            .field("generic", &keys(&self.generic))
            .field("protobuf", &keys(&self.protobuf))
            .finish()
    }
}

/// `order_placed`, `order-placed` and `order placed` all become `OrderPlaced`.
pub fn studly_case(name: &str) -> String {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Debug, Deserialize)]
    struct OrderPlaced {
        order_id: u64,
    }

    impl BusEvent for OrderPlaced {
        fn event_name(&self) -> &str {
            "OrderPlaced"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_studly_case() {
        assert_eq!(studly_case("order_placed"), "OrderPlaced");
        assert_eq!(studly_case("order-placed"), "OrderPlaced");
        assert_eq!(studly_case("order placed"), "OrderPlaced");
        assert_eq!(studly_case("orderPlaced"), "OrderPlaced");
        assert_eq!(studly_case(""), "");
    }

    #[test]
    fn test_generic_key() {
        let registry = EventRegistry::new("acme.events.");
        assert_eq!(registry.generic_key("user_created"), "acme.events.UserCreated");
        assert_eq!(EventRegistry::new("").generic_key("ping"), "Ping");
    }

    #[test]
    fn test_typed_registration() {
        let mut registry = EventRegistry::new("acme");
        registry.register::<OrderPlaced>(TargetKind::Serialized, "App\\Events\\OrderPlaced");

        let factory = registry
            .factory(TargetKind::Serialized, "App\\Events\\OrderPlaced")
            .unwrap();
        let mut fields = Map::new();
        fields.insert("order_id".into(), Value::from(7));
        let event = factory(fields).unwrap();
        let order = event.as_any().downcast_ref::<OrderPlaced>().unwrap();
        assert_eq!(order.order_id, 7);

        assert!(factory(Map::new()).is_err());
        assert!(!registry.contains(TargetKind::Generic, "App\\Events\\OrderPlaced"));
    }

    #[test]
    fn test_descriptor_registration() {
        let descriptor: RegistryDescriptor = serde_json::from_str(
            r#"{"serialized":["App\\Events\\Paid"],"generic":["user_created"],"protos":["acme.Ping"]}"#,
        )
        .unwrap();
        let registry = EventRegistry::from_descriptor("acme", &descriptor);

        assert_eq!(registry.len(), 3);
        assert!(registry.contains(TargetKind::Serialized, "App\\Events\\Paid"));
        assert!(registry.contains(TargetKind::Generic, "acme.UserCreated"));
        assert!(registry.contains(TargetKind::Protobuf, "acme.Ping"));
        assert!(!registry.contains(TargetKind::Unrecognized, "acme.Ping"));

        let factory = registry.factory(TargetKind::Generic, "acme.UserCreated").unwrap();
        let event = factory(Map::new()).unwrap();
        assert_eq!(event.event_name(), "acme.UserCreated");
    }
}
