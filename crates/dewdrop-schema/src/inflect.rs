//! English inflection for table names.
//!
//! Table names are snake_case; only the last segment is inflected
//! (`product_categories` -> `product_category`). Known irregulars are
//! handled here; everything else goes through `inflector`.

use inflector::Inflector;

const UNCOUNTABLE: &[&str] = &[
    "data",
    "equipment",
    "information",
    "media",
    "metadata",
    "money",
    "news",
    "series",
    "species",
    "staff",
];

// Irregulars the generic rules get wrong for schema names.
const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("mouse", "mice"),
    ("analysis", "analyses"),
    ("criterion", "criteria"),
    ("index", "indices"),
    ("matrix", "matrices"),
    ("vertex", "vertices"),
];

fn split_last(name: &str) -> (&str, &str) {
    match name.rfind('_') {
        Some(idx) => (&name[..=idx], &name[idx + 1..]),
        None => ("", name),
    }
}

/// Singular form of a snake_case table name.
pub fn singularize(name: &str) -> String {
    let (head, last) = split_last(name);
    let lower = last.to_ascii_lowercase();
    if last.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return name.to_string();
    }
    for &(singular, plural) in IRREGULAR {
        if lower == plural || lower == singular {
            return format!("{head}{singular}");
        }
    }
    if lower.ends_with("ss") {
        return name.to_string();
    }
    format!("{head}{}", last.to_singular())
}

/// Plural form of a snake_case table name.
pub fn pluralize(name: &str) -> String {
    let (head, last) = split_last(name);
    let lower = last.to_ascii_lowercase();
    if last.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return name.to_string();
    }
    for &(singular, plural) in IRREGULAR {
        if lower == singular || lower == plural {
            return format!("{head}{plural}");
        }
    }
    format!("{head}{}", last.to_plural())
}

/// `product_categories` -> `Product Categories`.
pub fn titleize(name: &str) -> String {
    name.to_title_case()
}

/// Display titles derived from a table name: (singular, plural).
pub fn table_titles(name: &str) -> (String, String) {
    let singular = singularize(name);
    let plural = pluralize(&singular);
    (titleize(&singular), titleize(&plural))
}
