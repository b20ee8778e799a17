//! Presentation helpers for opaque backend records.

use serde_json::Value;

const NAME_KEYS: &[&str] = &[
    "nome",
    "name",
    "nome_marca",
    "nome_material",
    "nome_setor",
    "nome_funcionario",
    "username",
    "descricao",
    "description",
    "title",
];

const MAX_LABEL_LEN: usize = 72;

/// Identifier of a record, if it exposes one.
///
/// `id` wins; otherwise the first scalar field named like `id_material` or
/// `idMarca` is used.
pub fn record_id(record: &Value) -> Option<String> {
    let object = record.as_object()?;
    if let Some(id) = object.get("id").and_then(scalar_text) {
        return Some(id);
    }
    object
        .iter()
        .filter(|(key, _)| is_id_key(key))
        .find_map(|(_, value)| scalar_text(value))
}

fn is_id_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    if lower.starts_with("id_") || lower.ends_with("_id") {
        return true;
    }
    // camelCase such as `idMarca`
    lower.starts_with("id") && key[2..].starts_with(|c: char| c.is_ascii_uppercase())
}

/// One-line label for list rows.
pub fn record_label(record: &Value) -> String {
    let name = record.as_object().and_then(|object| {
        NAME_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(scalar_text))
    });
    let label = match (record_id(record), name) {
        (Some(id), Some(name)) => format!("#{id} {name}"),
        (None, Some(name)) => name,
        (Some(id), None) => format!("#{id} {}", compact(record)),
        (None, None) => compact(record),
    };
    truncate(&label, MAX_LABEL_LEN)
}

/// Case-insensitive substring match over every scalar in the record.
pub fn record_matches(record: &Value, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    let mut haystack = Vec::new();
    collect_scalars(record, &mut haystack);
    haystack
        .iter()
        .any(|value| value.to_lowercase().contains(&needle))
}

/// `key: value` lines for a detail panel, nested values rendered as JSON.
pub fn record_fields(record: &Value) -> Vec<(String, String)> {
    match record {
        Value::Object(object) => object
            .iter()
            .map(|(key, value)| {
                let text = scalar_text(value).unwrap_or_else(|| value.to_string());
                (key.clone(), text)
            })
            .collect(),
        other => vec![("value".to_string(), other.to_string())],
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(num) => Some(num.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(object) => object.values().for_each(|item| collect_scalars(item, out)),
        Value::Array(items) => items.iter().for_each(|item| collect_scalars(item, out)),
        other => {
            if let Some(text) = scalar_text(other) {
                out.push(text);
            }
        }
    }
}

fn compact(record: &Value) -> String {
    record.to_string()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_plain_id_then_prefixed_ids() {
        assert_eq!(record_id(&json!({"id": 4, "id_marca": 9})).as_deref(), Some("4"));
        assert_eq!(record_id(&json!({"id_marca": 9, "nome": "A"})).as_deref(), Some("9"));
        assert_eq!(record_id(&json!({"idSetor": "s-1"})).as_deref(), Some("s-1"));
        assert_eq!(record_id(&json!({"identity": "x"})), None);
        assert_eq!(record_id(&json!([1, 2])), None);
    }

    #[test]
    fn labels_combine_id_and_name() {
        assert_eq!(record_label(&json!({"id": 1, "nome_marca": "Marca A"})), "#1 Marca A");
        assert_eq!(record_label(&json!({"name": "Parafuso M10"})), "Parafuso M10");
        assert_eq!(record_label(&json!({"id": 2, "qty": 5})), r#"#2 {"id":2,"qty":5}"#);
    }

    #[test]
    fn long_labels_are_truncated() {
        let label = record_label(&json!({"nome": "x".repeat(200)}));
        assert_eq!(label.chars().count(), MAX_LABEL_LEN);
        assert!(label.ends_with('…'));
    }

    #[test]
    fn filter_searches_nested_scalars() {
        let record = json!({"nome": "Marca A", "cnpj": "12.345.678/0001-90", "contato": {"fone": "(11) 98765-4321"}});
        assert!(record_matches(&record, "marca a"));
        assert!(record_matches(&record, "12.345"));
        assert!(record_matches(&record, "98765"));
        assert!(record_matches(&record, "  "));
        assert!(!record_matches(&record, "marca b"));
    }

    #[test]
    fn fields_render_nested_values_as_json() {
        let fields = record_fields(&json!({"id": 1, "tags": ["a"]}));
        assert_eq!(
            fields,
            vec![
                ("id".to_string(), "1".to_string()),
                ("tags".to_string(), r#"["a"]"#.to_string())
            ]
        );
    }
}
