//! Identifier quoting

/// Reserved words that must be quoted when used as column or table names.
const RESERVED_WORDS: &[&str] = &[
    "order", "group", "user", "table", "select", "from", "where", "join",
    "left", "right", "inner", "outer", "on", "and", "or", "not", "null",
    "true", "false", "limit", "offset", "as", "in", "is", "like", "between",
    "having", "union", "all", "distinct", "case", "when", "then", "else",
    "end", "create", "alter", "drop", "insert", "update", "delete", "index",
    "key", "primary", "default", "constraint", "check",
];

/// Quote an identifier if it collides with a reserved word or contains
/// characters outside `[A-Za-z0-9_]`. Dotted identifiers are quoted per part.
pub fn quote_ident(name: &str) -> String {
    if name.contains('.') {
        return name
            .split('.')
            .map(quote_single)
            .collect::<Vec<_>>()
            .join(".");
    }
    quote_single(name)
}

fn quote_single(name: &str) -> String {
    let lower = name.to_lowercase();
    let needs_quoting = RESERVED_WORDS.contains(&lower.as_str())
        || name.chars().any(|c| !c.is_alphanumeric() && c != '_')
        || name.chars().next().map(|c| c.is_numeric()).unwrap_or(false);

    if needs_quoting {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_pass_through() {
        assert_eq!(quote_ident("age"), "age");
        assert_eq!(quote_ident("fare_scaled"), "fare_scaled");
    }

    #[test]
    fn reserved_words_are_quoted() {
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("Select"), "\"Select\"");
    }

    #[test]
    fn dotted_names_quote_each_part() {
        assert_eq!(quote_ident("data_table.group"), "data_table.\"group\"");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
