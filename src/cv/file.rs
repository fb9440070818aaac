//! External CV file parsing
//!
//! Line-oriented, UTF-8. A leading `#` marks a metadata line
//! (`#<name> <value>`); the `#alias` marker carries an alias term line as
//! its value. Every other non-blank line holds one term:
//! `primary_key[|alt_key...]<TAB>name[<TAB>parent1,parent2,...]`.
//! The raw bytes of the file (newlines included) feed the CV-stream digest
//! exactly as read; parsing happens on the same bytes.

use crate::cv::{Cv, CvTerm};
use crate::error::{ModelError, Result};

/// Parse external CV content into `cv`, replacing any inline terms
pub fn parse_into(cv: &mut Cv, content: &str) -> Result<()> {
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if let Some(meta) = line.strip_prefix('#') {
            let (name, value) = match meta.split_once(char::is_whitespace) {
                Some((n, v)) => (n, v.trim()),
                None => (meta, ""),
            };
            match name {
                "alias" => {
                    let mut term = parse_term(cv, lineno, value)?;
                    term.alias = true;
                    cv.terms.insert(term)?;
                }
                "name" if cv.name.is_none() => cv.name = Some(value.to_string()),
                "description" if cv.description.is_none() => {
                    cv.description = Some(value.to_string())
                }
                _ => {} // unrecognized metadata is carried by the digest only
            }
            continue;
        }
        let term = parse_term(cv, lineno, line)?;
        cv.terms.insert(term)?;
    }
    Ok(())
}

/// Parse one term line
fn parse_term(cv: &Cv, lineno: usize, line: &str) -> Result<CvTerm> {
    let mut fields = line.split('\t');
    let keys = fields.next().unwrap_or("");
    if keys.is_empty() {
        return Err(ModelError::schema(
            format!("cv({}):{}", cv.id, lineno + 1),
            "term line without a key",
        ));
    }
    let mut key_parts = keys.split('|');
    let primary = key_parts.next().unwrap_or("").to_string();
    let alt_keys: Vec<String> = key_parts
        .filter(|k| !k.is_empty())
        .map(|k| k.to_string())
        .collect();

    let name = match fields.next() {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => primary.clone(),
    };
    let parents: Vec<String> = fields
        .next()
        .map(|p| {
            p.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    let mut term = CvTerm::new(primary, name);
    term.alt_keys = alt_keys;
    term.parents = parents;
    Ok(term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_file() {
        let mut cv = Cv::new("tissue");
        let content = "#name Tissue types\nbrain\tBrain\nliver|hepar\tLiver\n\ncortex\tCortex\tbrain\n";
        parse_into(&mut cv, content).unwrap();

        assert_eq!(cv.name.as_deref(), Some("Tissue types"));
        assert_eq!(cv.terms.len(), 3);
        assert_eq!(cv.terms.keys(), ["brain", "liver", "cortex"]);
        assert_eq!(cv.terms.resolve("hepar"), Some("liver"));
        assert_eq!(cv.terms.get("cortex").unwrap().parents, vec!["brain"]);
    }

    #[test]
    fn test_parse_alias_marker() {
        let mut cv = Cv::new("t");
        let content = "a\tA\nb\tB\n#alias ab\tEither\ta,b\n";
        parse_into(&mut cv, content).unwrap();

        let alias = cv.terms.get("ab").unwrap();
        assert!(alias.alias);
        assert_eq!(alias.parents, vec!["a", "b"]);
    }

    #[test]
    fn test_name_defaults_to_key() {
        let mut cv = Cv::new("t");
        parse_into(&mut cv, "solo\n").unwrap();
        assert_eq!(cv.terms.get("solo").unwrap().name, "solo");
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut cv = Cv::new("t");
        let err = parse_into(&mut cv, "a\tA\na\tAgain\n").unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { .. }));
    }
}
