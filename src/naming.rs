//! Table, class and column naming conventions.

use convert_case::{Case, Casing};

/// Pluralize the last word of a snake_case name.
pub fn pluralize(word: &str) -> String {
    if word.ends_with('s')
        || word.ends_with("sh")
        || word.ends_with("ch")
        || word.ends_with('x')
        || word.ends_with('z')
    {
        format!("{word}es")
    } else if let Some(stem) = word.strip_suffix('y') {
        if stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            format!("{word}s")
        } else {
            format!("{stem}ies")
        }
    } else {
        format!("{word}s")
    }
}

/// Plurals of nouns ending in a consonant followed by `use`.
const USE_WORDS: &[&str] = &[
    "uses", "abuses", "accuses", "excuses", "fuses", "muses", "recluses", "refuses", "ruses",
];

/// Singularize the last word of a snake_case name. Words that do not look
/// plural are returned unchanged.
pub fn singularize(word: &str) -> String {
    if word.len() < 2 {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    // `statuses`, `buses`; but `houses`, `causes` and the `-use` words keep
    // their `e`.
    if let Some(stem) = word.strip_suffix("uses") {
        let last = word.rsplit('_').next().unwrap_or(word);
        let vowel_before = stem.ends_with(['a', 'e', 'i', 'o', 'u']);
        if !vowel_before && !USE_WORDS.contains(&last) {
            return format!("{stem}us");
        }
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => word.to_string(),
    }
}

/// `order_items` -> `OrderItem`.
pub fn class_name(table: &str) -> String {
    singularize(table).to_case(Case::Pascal)
}

/// `OrderItem` -> `order_items`.
pub fn table_name(class: &str) -> String {
    pluralize(&snake(class))
}

/// `OrderItem` -> `order_item`.
pub fn snake(class: &str) -> String {
    class.to_case(Case::Snake)
}

/// Class referenced by a foreign-key column under the naming convention:
/// the singular of the column's first underscore segment.
///
/// `user_id` -> `User`, `users_id` -> `User`.
pub fn related_class(column: &str) -> String {
    let head = column.split('_').next().unwrap_or(column);
    class_name(head)
}

/// The two classes a junction table named `a_b` links, when its name splits
/// into exactly two segments.
pub fn junction_classes(table: &str) -> Option<(String, String)> {
    let mut segments = table.split('_');
    let (a, b) = (segments.next()?, segments.next()?);
    if segments.next().is_some() || a.is_empty() || b.is_empty() {
        return None;
    }
    Some((class_name(a), class_name(b)))
}

/// Junction table name for two classes: snake singular names in alphabetical
/// order, joined by `_`.
pub fn junction_table(a: &str, b: &str) -> String {
    let (a, b) = (snake(a), snake(b));
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}
