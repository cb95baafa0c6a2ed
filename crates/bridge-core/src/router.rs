//! Topic → destination table routing.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

/// Immutable mapping from source topic to destination table.
///
/// Built once at startup and shared (behind an `Arc`) by every driver that
/// needs it. Several topics may feed the same table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRouter {
    routes: BTreeMap<String, String>,
}

impl TopicRouter {
    /// Create a router from `(topic, table)` pairs.
    ///
    /// Fails if the mapping is empty, a topic is blank, or a table name is not a
    /// plain identifier. Table names end up inside DDL statements, so anything
    /// beyond `[A-Za-z_][A-Za-z0-9_]*` is rejected here.
    pub fn new<I, T, U>(routes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (T, U)>,
        T: Into<String>,
        U: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (topic, table) in routes {
            let topic = topic.into();
            let table = table.into();
            if topic.trim().is_empty() {
                return Err(Error::InvalidConfig("topic name is empty".to_string()));
            }
            if !is_valid_table_name(&table) {
                return Err(Error::InvalidConfig(format!(
                    "table name '{table}' for topic '{topic}' is not a valid identifier"
                )));
            }
            map.insert(topic, table);
        }

        if map.is_empty() {
            return Err(Error::InvalidConfig(
                "topic to table mapping is empty".to_string(),
            ));
        }

        Ok(Self { routes: map })
    }

    /// Destination table for `topic`, if the topic is mapped.
    pub fn resolve(&self, topic: &str) -> Option<&str> {
        self.routes.get(topic).map(String::as_str)
    }

    /// Every mapped topic, sorted.
    pub fn topics(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Every distinct destination table, sorted.
    pub fn tables(&self) -> Vec<&str> {
        self.routes
            .values()
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(t, d)| (t.as_str(), d.as_str()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ecom_router() -> TopicRouter {
        TopicRouter::new([
            ("mongo.ecom.ecom.customers", "mongo_ecom_customers"),
            ("mongo.ecom.ecom.products", "mongo_ecom_products"),
            ("mongo.ecom.ecom.orders", "mongo_ecom_orders"),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_known_topic() {
        let router = ecom_router();
        assert_eq!(
            router.resolve("mongo.ecom.ecom.orders"),
            Some("mongo_ecom_orders")
        );
    }

    #[test]
    fn test_resolve_unknown_topic_is_absent() {
        let router = ecom_router();
        assert_eq!(router.resolve("mongo.ecom.ecom.reviews"), None);
        assert_eq!(router.resolve(""), None);
        // Lookups are exact, no prefix matching
        assert_eq!(router.resolve("mongo.ecom.ecom"), None);
    }

    #[test]
    fn test_topics_and_tables() {
        let router = TopicRouter::new([
            ("a.orders", "orders"),
            ("b.orders", "orders"),
            ("a.users", "users"),
        ])
        .unwrap();

        assert_eq!(router.topics(), vec!["a.orders", "a.users", "b.orders"]);
        assert_eq!(router.tables(), vec!["orders", "users"]);
        assert_eq!(router.len(), 3);
    }

    #[test]
    fn test_empty_mapping_rejected() {
        let routes: Vec<(String, String)> = vec![];
        assert!(matches!(
            TopicRouter::new(routes),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_table_names_rejected() {
        for bad in ["", "1table", "orders; DROP TABLE x", "db.orders", "my-table"] {
            let result = TopicRouter::new([("topic", bad)]);
            assert!(result.is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn test_blank_topic_rejected() {
        assert!(TopicRouter::new([("  ", "orders")]).is_err());
    }

    #[test]
    fn test_valid_table_names() {
        assert!(is_valid_table_name("mongo_ecom_orders"));
        assert!(is_valid_table_name("_staging"));
        assert!(is_valid_table_name("T2"));
    }
}
