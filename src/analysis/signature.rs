//! Type names mentioned in signatures and definitions.
//!
//! Haskell type constructors start with an uppercase letter; a qualified name
//! such as `Map.Map` names the type after its last dot.

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '\'' || c == '.'
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_ident_char(c))
        .filter_map(|w| w.trim_matches('.').rsplit('.').next())
        .filter(|w| !w.is_empty())
}

/// Type constructor names in `signature`, in order of first appearance.
pub fn type_names(signature: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for word in words(signature) {
        if word.starts_with(|c: char| c.is_uppercase()) && !names.contains(&word) {
            names.push(word);
        }
    }
    names
}

/// Whether `text` mentions `name` as a whole word.
pub fn mentions(text: &str, name: &str) -> bool {
    words(text).any(|w| w == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_in_order_without_duplicates() {
        assert_eq!(
            type_names("Config -> Map.Map Text [Token] -> Either Error (Maybe Config)"),
            vec!["Config", "Map", "Text", "Token", "Either", "Error", "Maybe"]
        );
        assert!(type_names("a -> b -> a").is_empty());
    }

    #[test]
    fn test_mentions_whole_words_only() {
        assert!(mentions("Text -> Expr", "Expr"));
        assert!(mentions("instance Pretty Expr", "Pretty"));
        assert!(!mentions("ParseState -> Either Error Exprs", "Expr"));
        assert!(!mentions("instance PrettyPrint Expr", "Pretty"));
        assert!(mentions("AST.Expr -> Int", "Expr"));
    }
}
