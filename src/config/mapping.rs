//! Topic → table mapping sources.
//!
//! Resolution order:
//! 1. `--mapping-file` (TOML, a `[topics]` table) replaces the built-in mapping
//! 2. `--topic-map topic=table` flags are applied on top and win over file entries
//! 3. With neither, [`DEFAULT_TOPIC_MAPPING`] is used
//!
//! ```toml
//! [topics]
//! "mongo.ecom.ecom.orders" = "mongo_ecom_orders"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use cdc_bridge_core::TopicRouter;
use serde::Deserialize;
use tracing::debug;

/// Debezium MongoDB topics of the e-commerce demo database.
pub const DEFAULT_TOPIC_MAPPING: [(&str, &str); 3] = [
    ("mongo.ecom.ecom.customers", "mongo_ecom_customers"),
    ("mongo.ecom.ecom.products", "mongo_ecom_products"),
    ("mongo.ecom.ecom.orders", "mongo_ecom_orders"),
];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingFile {
    #[serde(default)]
    topics: BTreeMap<String, String>,
}

/// Read the `[topics]` table of a mapping file.
pub fn load_mapping_file(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file {}", path.display()))?;
    parse_mapping(&content)
        .with_context(|| format!("Failed to parse mapping file {}", path.display()))
}

fn parse_mapping(content: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let file: MappingFile = toml::from_str(content)?;
    if file.topics.is_empty() {
        anyhow::bail!("no entries in [topics]");
    }
    Ok(file.topics)
}

/// Parse one `topic=table` pair. The table is everything after the last `=`.
pub fn parse_topic_map(s: &str) -> anyhow::Result<(String, String)> {
    let (topic, table) = s
        .rsplit_once('=')
        .with_context(|| format!("Expected topic=table, got '{s}'"))?;
    let (topic, table) = (topic.trim(), table.trim());
    if topic.is_empty() || table.is_empty() {
        anyhow::bail!("Expected topic=table, got '{s}'");
    }
    Ok((topic.to_string(), table.to_string()))
}

/// clap `value_parser` adapter for [`parse_topic_map`].
pub fn topic_map_arg(s: &str) -> Result<(String, String), String> {
    parse_topic_map(s).map_err(|e| format!("{e:#}"))
}

/// Build the router from the configured mapping sources.
pub fn build_router(
    mapping_file: Option<&Path>,
    overrides: &[(String, String)],
) -> anyhow::Result<TopicRouter> {
    let mut routes = match mapping_file {
        Some(path) => load_mapping_file(path)?,
        None if overrides.is_empty() => DEFAULT_TOPIC_MAPPING
            .iter()
            .map(|(topic, table)| (topic.to_string(), table.to_string()))
            .collect(),
        None => BTreeMap::new(),
    };

    for (topic, table) in overrides {
        if let Some(previous) = routes.insert(topic.clone(), table.clone()) {
            debug!("Topic {topic} remapped from {previous} to {table}");
        }
    }

    TopicRouter::new(routes).context("Invalid topic mapping")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn mapping_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_mapping() {
        let router = build_router(None, &[]).unwrap();
        assert_eq!(router.len(), 3);
        assert_eq!(
            router.resolve("mongo.ecom.ecom.orders"),
            Some("mongo_ecom_orders")
        );
        assert_eq!(router.resolve("mongo.ecom.ecom.reviews"), None);
    }

    #[test]
    fn test_mapping_file_replaces_default() {
        let file = mapping_file(
            r#"
[topics]
"pg.public.invoices" = "pg_invoices"
"pg.public.payments" = "pg_payments"
"#,
        );
        let router = build_router(Some(file.path()), &[]).unwrap();
        assert_eq!(router.topics(), vec!["pg.public.invoices", "pg.public.payments"]);
        assert_eq!(router.resolve("mongo.ecom.ecom.orders"), None);
    }

    #[test]
    fn test_flags_win_over_file() {
        let file = mapping_file("[topics]\n\"orders\" = \"orders_v1\"\n");
        let overrides = vec![
            ("orders".to_string(), "orders_v2".to_string()),
            ("refunds".to_string(), "refunds".to_string()),
        ];
        let router = build_router(Some(file.path()), &overrides).unwrap();
        assert_eq!(router.resolve("orders"), Some("orders_v2"));
        assert_eq!(router.resolve("refunds"), Some("refunds"));
    }

    #[test]
    fn test_flags_alone_replace_default() {
        let overrides = vec![("events".to_string(), "raw_events".to_string())];
        let router = build_router(None, &overrides).unwrap();
        assert_eq!(router.len(), 1);
        assert_eq!(router.resolve("events"), Some("raw_events"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = build_router(Some(Path::new("/nonexistent/mapping.toml")), &[]).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read mapping file"));
    }

    #[test]
    fn test_empty_or_unknown_sections_rejected() {
        assert!(parse_mapping("[topics]\n").is_err());
        assert!(parse_mapping("[tables]\n\"a\" = \"b\"\n").is_err());
    }

    #[test]
    fn test_invalid_table_name_rejected() {
        let overrides = vec![("orders".to_string(), "orders; DROP".to_string())];
        let err = build_router(None, &overrides).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid topic mapping"));
    }

    #[test]
    fn test_parse_topic_map() {
        assert_eq!(
            parse_topic_map("mongo.ecom.ecom.orders=orders").unwrap(),
            ("mongo.ecom.ecom.orders".to_string(), "orders".to_string())
        );
        assert_eq!(
            parse_topic_map(" a.b = c ").unwrap(),
            ("a.b".to_string(), "c".to_string())
        );
        assert!(parse_topic_map("orders").is_err());
        assert!(parse_topic_map("=orders").is_err());
        assert!(parse_topic_map("orders=").is_err());
    }
}
