//! Naming resolution
//!
//! Turns SQL identifiers into Go identifiers and serialization tag names. All
//! functions here are pure string transformations.
//!
//! Escape rule for generated identifiers: a Go keyword or a reserved member
//! name gets a trailing `_`; an empty identifier or one starting with a digit
//! gets a leading `X`.

use std::fmt;
use std::str::FromStr;

use crate::error::GormtoolError;

/// Naming convention applied to serialization tags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NameConvention {
    /// `test_field` -> `testField`
    Camel,
    /// `test_field` -> `TestField`
    Pascal,
    /// `test_field` -> `test_field`
    #[default]
    Under,
}

impl FromStr for NameConvention {
    type Err = GormtoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "camel" => Ok(Self::Camel),
            "pascal" => Ok(Self::Pascal),
            "under" | "snake" | "" => Ok(Self::Under),
            other => Err(GormtoolError::Config(format!(
                "unknown naming strategy {:?} (expected camel, pascal or under)",
                other
            ))),
        }
    }
}

impl fmt::Display for NameConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Camel => "camel",
            Self::Pascal => "pascal",
            Self::Under => "under",
        };
        f.write_str(s)
    }
}

/// Table naming rules applied before a table name becomes a struct name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableNaming {
    pub table_prefix: String,
    /// Table names are already singular and are not inflected
    pub singular_table: bool,
}

const GO_KEYWORDS: &[&str] = &[
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// Methods every generated model carries
const RESERVED_MEMBERS: &[&str] = &["TableName"];

/// Words gorm writes fully uppercased in Go identifiers
const COMMON_INITIALISMS: &[&str] = &[
    "API", "ASCII", "CPU", "CSS", "DNS", "EOF", "GUID", "HTML", "HTTP", "HTTPS", "ID", "IP",
    "JSON", "LHS", "QPS", "RAM", "RHS", "RPC", "SLA", "SMTP", "SSH", "TLS", "TTL", "UID", "UI",
    "UUID", "URI", "URL", "UTF8", "VM", "XML", "XSRF", "XSS",
];

/// Convert a snake-delimited name under `convention`
pub fn convert(name: &str, convention: NameConvention) -> String {
    match convention {
        NameConvention::Under => name.to_string(),
        NameConvention::Pascal => name.split('_').map(upper_first).collect(),
        NameConvention::Camel => name
            .split('_')
            .enumerate()
            .map(|(i, segment)| {
                if i == 0 {
                    lower_first(segment)
                } else {
                    upper_first(segment)
                }
            })
            .collect(),
    }
}

/// Struct name for a table: strip prefix, then singularize, then pascal-case
///
/// With `singular_table` set the stripped name is used as is.
pub fn resolve_table_name(table: &str, naming: &TableNaming) -> String {
    let stripped = strip_prefix(table, &naming.table_prefix);
    let base = if naming.singular_table {
        stripped.to_string()
    } else {
        singularize_last_segment(stripped)
    };
    go_identifier(&base)
}

/// Exported Go field identifier for a column
pub fn resolve_field_name(column: &str) -> String {
    go_identifier(column)
}

fn go_identifier(name: &str) -> String {
    let pascal = convert(&sanitize(name), NameConvention::Pascal);
    escape_identifier(apply_initialisms(&pascal))
}

/// Uppercase every capitalized word that is a common initialism, e.g.
/// `UserId` -> `UserID`, `ApiUrl` -> `APIURL`
pub fn apply_initialisms(pascal: &str) -> String {
    let mut out = String::with_capacity(pascal.len());
    let mut word = String::new();
    for c in pascal.chars() {
        if c.is_uppercase() && !word.is_empty() {
            push_word(&mut out, &word);
            word.clear();
        }
        word.push(c);
    }
    push_word(&mut out, &word);
    out
}

fn push_word(out: &mut String, word: &str) {
    let upper = word.to_uppercase();
    let capitalized = word.starts_with(|c: char| c.is_uppercase());
    if capitalized && word.len() > 1 && COMMON_INITIALISMS.contains(&upper.as_str()) {
        out.push_str(&upper);
    } else {
        out.push_str(word);
    }
}

/// Serialization tag name for a column
pub fn resolve_tag_name(column: &str, convention: NameConvention) -> String {
    convert(column, convention)
}

/// Go package name from a configured package path such as `dao/model`
pub fn resolve_package_name(path: &str) -> String {
    let last = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    escape_identifier(sanitize(last).to_lowercase())
}

/// Apply the keyword / leading-digit escape rule
pub fn escape_identifier(ident: String) -> String {
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("X{}", ident);
    }
    if GO_KEYWORDS.contains(&ident.as_str()) || RESERVED_MEMBERS.contains(&ident.as_str()) {
        return format!("{}_", ident);
    }
    ident
}

fn strip_prefix<'a>(table: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        return table;
    }
    match table.strip_prefix(prefix) {
        Some(rest) if !rest.is_empty() => rest,
        _ => table,
    }
}

/// Replace characters that cannot appear in a Go identifier with `_`
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
    }
}

fn singularize_last_segment(name: &str) -> String {
    match name.rfind('_') {
        Some(pos) => format!("{}{}", &name[..=pos], singularize(&name[pos + 1..])),
        None => singularize(name),
    }
}

const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("men", "man"),
    ("women", "woman"),
    ("children", "child"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("teeth", "tooth"),
    ("feet", "foot"),
    ("indices", "index"),
];

const UNCOUNTABLE: &[&str] = &[
    "data",
    "equipment",
    "information",
    "metadata",
    "money",
    "news",
    "series",
    "species",
    "staff",
];

/// Singular form of an English word (heuristic)
pub fn singularize(word: &str) -> String {
    if !word.is_ascii() {
        return word.to_string();
    }
    let lower = word.to_ascii_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        return match_case(word, singular);
    }

    if lower.len() > 3 && lower.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if lower.ends_with("sses") {
        return word[..word.len() - 2].to_string();
    }
    if ["xes", "ches", "shes", "zzes"]
        .iter()
        .any(|suffix| lower.ends_with(suffix))
    {
        return word[..word.len() - 2].to_string();
    }
    if lower.len() > 1
        && lower.ends_with('s')
        && !lower.ends_with("ss")
        && !lower.ends_with("us")
        && !lower.ends_with("is")
    {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Reuse the first-letter case of `original` for a replacement word
fn match_case(original: &str, replacement: &str) -> String {
    if original.starts_with(|c: char| c.is_uppercase()) {
        upper_first(replacement)
    } else {
        replacement.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_conventions() {
        assert_eq!(convert("test_field", NameConvention::Camel), "testField");
        assert_eq!(convert("test_field", NameConvention::Pascal), "TestField");
        assert_eq!(convert("test_field", NameConvention::Under), "test_field");
        assert_eq!(convert("order_line_items", NameConvention::Pascal), "OrderLineItems");
    }

    #[test]
    fn test_convert_empty_and_odd_segments() {
        for convention in [NameConvention::Camel, NameConvention::Pascal, NameConvention::Under] {
            assert_eq!(convert("", convention), "");
        }
        assert_eq!(convert("_id", NameConvention::Camel), "Id");
        assert_eq!(convert("a__b", NameConvention::Pascal), "AB");
        assert_eq!(convert("ID", NameConvention::Camel), "iD");
    }

    #[test]
    fn test_convert_is_idempotent() {
        let inputs = ["test_field", "testField", "TestField", "user_id", "x", "a_b_c", "created_at"];
        for convention in [NameConvention::Camel, NameConvention::Pascal, NameConvention::Under] {
            for input in inputs {
                let once = convert(input, convention);
                assert_eq!(convert(&once, convention), once, "{} under {}", input, convention);
            }
        }
        assert_eq!(convert("testField", NameConvention::Camel), "testField");
    }

    #[test]
    fn test_convention_from_str() {
        assert_eq!("camel".parse::<NameConvention>().unwrap(), NameConvention::Camel);
        assert_eq!("Pascal".parse::<NameConvention>().unwrap(), NameConvention::Pascal);
        assert_eq!("under".parse::<NameConvention>().unwrap(), NameConvention::Under);
        assert_eq!("".parse::<NameConvention>().unwrap(), NameConvention::Under);
        let err = "kebab".parse::<NameConvention>().unwrap_err();
        assert!(err.to_string().contains("kebab"));
    }

    #[test]
    fn test_resolve_table_name_singular_by_default() {
        let naming = TableNaming::default();
        assert_eq!(resolve_table_name("orders", &naming), "Order");
        assert_eq!(resolve_table_name("user_accounts", &naming), "UserAccount");
        assert_eq!(resolve_table_name("people", &naming), "Person");
        assert_eq!(resolve_table_name("news", &naming), "News");
    }

    #[test]
    fn test_resolve_table_name_singular_table_keeps_name() {
        let naming = TableNaming {
            table_prefix: String::new(),
            singular_table: true,
        };
        assert_eq!(resolve_table_name("users", &naming), "Users");
        assert_eq!(resolve_table_name("user", &naming), "User");
    }

    #[test]
    fn test_resolve_table_name_strip_then_singularize() {
        let naming = TableNaming {
            table_prefix: "t_".to_string(),
            singular_table: false,
        };
        assert_eq!(resolve_table_name("t_users", &naming), "User");
        assert_eq!(resolve_table_name("users", &naming), "User");
        assert_eq!(resolve_table_name("t_order_categories", &naming), "OrderCategory");
        // prefix alone is not stripped to an empty name
        assert_eq!(resolve_table_name("t_", &naming), "T");
    }

    #[test]
    fn test_resolve_table_name_escapes() {
        let naming = TableNaming::default();
        assert_eq!(resolve_table_name("2fa_codes", &naming), "X2faCode");
        assert_eq!(resolve_table_name("table_name", &naming), "TableName_");
        assert_eq!(resolve_table_name("audit-log", &naming), "AuditLog");
        assert_eq!(resolve_table_name("api_keys", &naming), "APIKey");
    }

    #[test]
    fn test_apply_initialisms() {
        assert_eq!(apply_initialisms("Id"), "ID");
        assert_eq!(apply_initialisms("UserId"), "UserID");
        assert_eq!(apply_initialisms("ApiUrl"), "APIURL");
        assert_eq!(apply_initialisms("Utf8Name"), "UTF8Name");
        // only whole words
        assert_eq!(apply_initialisms("Idea"), "Idea");
        assert_eq!(apply_initialisms("Ids"), "Ids");
        assert_eq!(apply_initialisms("HTTPServer"), "HTTPServer");
        assert_eq!(apply_initialisms(""), "");
    }

    #[test]
    fn test_resolve_field_name() {
        assert_eq!(resolve_field_name("id"), "ID");
        assert_eq!(resolve_field_name("user_id"), "UserID");
        assert_eq!(resolve_field_name("userId"), "UserID");
        assert_eq!(resolve_field_name("uuid"), "UUID");
        assert_eq!(resolve_field_name("table_name"), "TableName_");
        assert_eq!(resolve_field_name("1st_place"), "X1stPlace");
        assert_eq!(resolve_field_name("_"), "X");
        assert_eq!(resolve_field_name("unit price"), "UnitPrice");
    }

    #[test]
    fn test_resolve_tag_name() {
        assert_eq!(resolve_tag_name("created_at", NameConvention::Camel), "createdAt");
        assert_eq!(resolve_tag_name("created_at", NameConvention::Pascal), "CreatedAt");
        assert_eq!(resolve_tag_name("created_at", NameConvention::Under), "created_at");
    }

    #[test]
    fn test_resolve_package_name() {
        assert_eq!(resolve_package_name("model"), "model");
        assert_eq!(resolve_package_name("dao/model/"), "model");
        assert_eq!(resolve_package_name("type"), "type_");
        assert_eq!(resolve_package_name("my-models"), "my_models");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("matches"), "match");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("analysis"), "analysis");
        assert_eq!(singularize("staff"), "staff");
        assert_eq!(singularize("People"), "Person");
        assert_eq!(singularize("news"), "news");
        assert_eq!(singularize("s"), "s");
    }
}
