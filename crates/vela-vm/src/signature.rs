//! Declaration strings for native bindings.
//!
//! ```text
//! name(a, b=1, *args, c='x', **kwargs)
//! ```
//!
//! Defaults are literals: integers, floats, quoted strings, `None`, `True`
//! and `False`. Parameters after `*args` (or a bare `*`) are keyword-only.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignatureError {
    #[error("expected `name(params)`, got `{0}`")]
    Malformed(String),

    #[error("`{0}` is not a valid identifier")]
    BadIdentifier(String),

    #[error("invalid default value `{0}`")]
    BadDefault(String),

    #[error("duplicate parameter `{0}`")]
    Duplicate(String),

    #[error("non-default parameter `{0}` follows a default parameter")]
    DefaultOrder(String),

    #[error("`{0}` must be the last parameter")]
    KwargsNotLast(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    None,
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SigParam {
    pub name: String,
    pub default: Option<Literal>,
    pub kw_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<SigParam>,
    pub star_args: Option<String>,
    pub star_kwargs: Option<String>,
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => chars.all(|c| c == '_' || c.is_alphanumeric()),
        _ => false,
    }
}

fn ident(s: &str) -> Result<String, SignatureError> {
    if is_ident(s) {
        Ok(s.to_owned())
    } else {
        Err(SignatureError::BadIdentifier(s.to_owned()))
    }
}

/// Splits on commas outside of quotes.
fn split_params(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(_), _) if escaped => escaped = false,
            (Some(_), '\\') => escaped = true,
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ',') => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() || !out.is_empty() {
        out.push(last);
    }
    out
}

fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next()? {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            c @ ('\\' | '\'' | '"') => c,
            _ => return None,
        });
    }
    Some(out)
}

fn parse_literal(s: &str) -> Result<Literal, SignatureError> {
    let bad = || SignatureError::BadDefault(s.to_owned());
    match s {
        "None" => return Ok(Literal::None),
        "True" => return Ok(Literal::Bool(true)),
        "False" => return Ok(Literal::Bool(false)),
        _ => {}
    }
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') {
        if bytes[bytes.len() - 1] != bytes[0] {
            return Err(bad());
        }
        return unescape(&s[1..s.len() - 1]).map(Literal::Str).ok_or_else(bad);
    }
    if let Ok(i) = s.parse::<i64>() {
        return Ok(Literal::Int(i));
    }
    s.parse::<f64>().map(Literal::Float).map_err(|_| bad())
}

pub fn parse_signature(decl: &str) -> Result<Signature, SignatureError> {
    let decl = decl.trim();
    let malformed = || SignatureError::Malformed(decl.to_owned());
    let open = decl.find('(').ok_or_else(malformed)?;
    if !decl.ends_with(')') {
        return Err(malformed());
    }
    let name = ident(decl[..open].trim())?;
    let inner = &decl[open + 1..decl.len() - 1];

    let mut sig = Signature { name, params: Vec::new(), star_args: None, star_kwargs: None };
    let mut kw_only = false;
    let mut seen_default = false;
    let mut seen = Vec::<String>::new();
    let mut check_dup = |n: &str| {
        if seen.iter().any(|s| s == n) {
            return Err(SignatureError::Duplicate(n.to_owned()));
        }
        seen.push(n.to_owned());
        Ok(())
    };

    for tok in split_params(inner) {
        if let Some(k) = sig.star_kwargs.as_ref() {
            return Err(SignatureError::KwargsNotLast(format!("**{k}")));
        }
        if tok.is_empty() {
            return Err(malformed());
        }
        if let Some(rest) = tok.strip_prefix("**") {
            let n = ident(rest.trim())?;
            check_dup(&n)?;
            sig.star_kwargs = Some(n);
        } else if let Some(rest) = tok.strip_prefix('*') {
            if kw_only {
                return Err(malformed());
            }
            kw_only = true;
            let rest = rest.trim();
            if !rest.is_empty() {
                let n = ident(rest)?;
                check_dup(&n)?;
                sig.star_args = Some(n);
            }
        } else {
            let (n, default) = match tok.split_once('=') {
                Some((n, d)) => (n.trim(), Some(parse_literal(d.trim())?)),
                None => (tok, None),
            };
            let n = ident(n)?;
            check_dup(&n)?;
            if !kw_only {
                if default.is_some() {
                    seen_default = true;
                } else if seen_default {
                    return Err(SignatureError::DefaultOrder(n));
                }
            }
            sig.params.push(SigParam { name: n, default, kw_only });
        }
    }
    Ok(sig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_signature() {
        let sig = parse_signature("f(a, b=2, *args, sep=', ', end=\"\\n\", **kw)").unwrap();
        assert_eq!(sig.name, "f");
        let names: Vec<_> = sig.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "sep", "end"]);
        assert_eq!(sig.params[1].default, Some(Literal::Int(2)));
        assert_eq!(sig.params[2].default, Some(Literal::Str(", ".into())));
        assert!(sig.params[2].kw_only);
        assert!(!sig.params[1].kw_only);
        assert_eq!(sig.star_args.as_deref(), Some("args"));
        assert_eq!(sig.star_kwargs.as_deref(), Some("kw"));
    }

    #[test]
    fn test_literals() {
        let sig = parse_signature("g(a=None, b=True, c=False, d=-1.5, e='')").unwrap();
        let defaults: Vec<_> = sig.params.into_iter().map(|p| p.default.unwrap()).collect();
        assert_eq!(
            defaults,
            vec![
                Literal::None,
                Literal::Bool(true),
                Literal::Bool(false),
                Literal::Float(-1.5),
                Literal::Str(String::new())
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let sig = parse_signature(r"p(sep=' ', end='\n', q='a\'b, c')").unwrap();
        assert_eq!(sig.params[1].default, Some(Literal::Str("\n".into())));
        assert_eq!(sig.params[2].default, Some(Literal::Str("a'b, c".into())));
        assert_eq!(sig.params.len(), 3);
    }

    #[test]
    fn test_empty_and_bare_star() {
        let sig = parse_signature("h()").unwrap();
        assert!(sig.params.is_empty());
        let sig = parse_signature("k(a, *, b)").unwrap();
        assert!(sig.star_args.is_none());
        assert!(sig.params[1].kw_only);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_signature("nope"), Err(SignatureError::Malformed(_))));
        assert!(matches!(parse_signature("f(a=1, b)"), Err(SignatureError::DefaultOrder(_))));
        assert!(matches!(parse_signature("f(a, a)"), Err(SignatureError::Duplicate(_))));
        assert!(matches!(parse_signature("f(**kw, a)"), Err(SignatureError::KwargsNotLast(_))));
        assert!(matches!(parse_signature("f(a=[])"), Err(SignatureError::BadDefault(_))));
        assert!(matches!(parse_signature("1f()"), Err(SignatureError::BadIdentifier(_))));
    }
}
