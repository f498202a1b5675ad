//! Code-aware tokenization
//!
//! Identifiers are split on punctuation, whitespace, snake_case and camelCase
//! transitions and lowercased, so `getUserName`, `get_user_name` and
//! `GetUserName` all produce `get user name`.

/// Split text into lowercase identifier parts
pub fn tokenize_code(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        split_camel(word, &mut tokens);
    }
    tokens
}

/// Unique tokens in first-seen order
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize_code(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn split_camel(word: &str, out: &mut Vec<String>) {
    let chars: Vec<char> = word.chars().collect();
    let mut start = 0;
    for i in 1..chars.len() {
        let prev = chars[i - 1];
        let cur = chars[i];
        let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
        let boundary = (cur.is_uppercase() && (prev.is_lowercase() || prev.is_ascii_digit()))
            // HTTPServer -> HTTP Server
            || (cur.is_uppercase() && prev.is_uppercase() && next_is_lower);
        if boundary {
            out.push(chars[start..i].iter().collect::<String>().to_lowercase());
            start = i;
        }
    }
    if start < chars.len() {
        out.push(chars[start..].iter().collect::<String>().to_lowercase());
    }
}
