//! URI handling and the JSON Pointer fragment forms used by `$ref`.
use std::borrow::Cow;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;
use url::Url;

use crate::Error;

/// Characters escaped when a pointer token is emitted into a `$ref` fragment.
const FRAGMENT_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'#')
    .add(b'%')
    .add(b'[')
    .add(b']')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

/// Parses an absolute URI. Spaces are percent-encoded by the parser.
///
/// # Errors
///
/// [`Error::InvalidIdentifier`] when the input is not an absolute URI.
pub fn parse(input: &str) -> Result<Url, Error> {
    Url::parse(input).map_err(|error| Error::invalid_identifier(input, Some(Box::new(error))))
}

/// Resolves a URI reference against the given base per RFC 3986.
pub(crate) fn resolve(base: &Url, reference: &str) -> Result<Url, Error> {
    base.join(reference)
        .map_err(|error| Error::invalid_identifier(reference, Some(Box::new(error))))
}

pub(crate) fn without_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

/// Clears a present-but-empty fragment. `http://x/a#` and `http://x/a` are
/// distinct URLs until this runs; identifiers and scopes use the bare form.
pub(crate) fn strip_trailing_hash(url: &mut Url) {
    if let Some("") = url.fragment() {
        url.set_fragment(None);
    }
}

/// Renders `id` relative to `root` when both share scheme and authority,
/// otherwise absolute.
pub(crate) fn relative_identifier(root: &Url, id: &Url) -> String {
    if root.scheme() == id.scheme() && root.authority() == id.authority() {
        if let Some(relative) = root.make_relative(id) {
            if !relative.is_empty() {
                return relative;
            }
        }
    }
    id.to_string()
}

/// Escapes one pointer token for emission inside a `$ref` fragment:
/// `~` and `/` become `~0` and `~1`, URI-hostile characters are
/// percent-encoded.
pub(crate) fn escape_token(token: &str) -> String {
    let escaped = if token.contains('~') || token.contains('/') {
        Cow::Owned(token.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(token)
    };
    utf8_percent_encode(&escaped, FRAGMENT_ESCAPE).to_string()
}

/// Reverses `~1` and `~0` in a single decoded pointer token.
pub(crate) fn unescape_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains('~') {
        Cow::Owned(segment.replace("~1", "/").replace("~0", "~"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Splits a `#`-less pointer fragment (`/a/b~1c`) into decoded tokens.
/// Returns `None` when the percent-encoding does not decode to UTF-8.
pub(crate) fn fragment_tokens(fragment: &str) -> Option<Vec<String>> {
    let decoded = percent_encoding::percent_decode_str(fragment)
        .decode_utf8()
        .ok()?;
    Some(
        decoded
            .split('/')
            .skip(1)
            .map(|segment| unescape_segment(segment).into_owned())
            .collect(),
    )
}

/// Renders decoded tokens back into a canonical pointer fragment.
pub(crate) fn fragment_from_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut fragment = String::new();
    for token in tokens {
        fragment.push('/');
        fragment.push_str(&escape_token(token.as_ref()));
    }
    fragment
}

/// Evaluates the pointer described by decoded tokens against a document.
pub(crate) fn lookup<'a>(document: &'a Value, tokens: &[String]) -> Option<&'a Value> {
    let mut target = document;
    for token in tokens {
        target = match target {
            Value::Object(map) => map.get(token)?,
            Value::Array(items) => items.get(parse_index(token)?)?,
            _ => return None,
        };
    }
    Some(target)
}

/// Evaluates a pointer fragment (`/a/b`) against a document.
pub(crate) fn pointer<'a>(document: &'a Value, fragment: &str) -> Option<&'a Value> {
    let tokens = fragment_tokens(fragment)?;
    lookup(document, &tokens)
}

fn parse_index(token: &str) -> Option<usize> {
    if token.starts_with('+') || (token.starts_with('0') && token.len() != 1) {
        None
    } else {
        token.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;
    use url::Url;

    use super::*;

    #[test_case("abc")]
    #[test_case("a~b"; "tilde in middle")]
    #[test_case("a/b"; "slash in middle")]
    #[test_case("~/"; "tilde then slash")]
    #[test_case("/~"; "slash then tilde")]
    #[test_case("~0"; "literal escape sequence")]
    #[test_case("a b%c")]
    #[test_case(""; "empty token")]
    fn escape_round_trip(token: &str) {
        let fragment = fragment_from_tokens(&[token]);
        let tokens = fragment_tokens(&fragment).expect("Invalid fragment");
        assert_eq!(tokens, vec![token.to_string()]);
    }

    #[test]
    fn parse_encodes_spaces() {
        let url = parse("http://example.com/a schema.json").expect("Invalid URL");
        assert_eq!(url.path(), "/a%20schema.json");
    }

    #[test]
    fn trailing_hash_is_stripped() {
        let mut url = Url::parse("http://example.com/a#").expect("Invalid URL");
        assert_eq!(url.fragment(), Some(""));
        strip_trailing_hash(&mut url);
        assert_eq!(url.fragment(), None);
        assert_eq!(url.as_str(), "http://example.com/a");
    }

    #[test_case("http://x.com/dir/a.json", "http://x.com/dir/sub/b.json", "sub/b.json")]
    #[test_case("http://x.com/dir/a.json", "http://x.com/b.json", "../b.json")]
    #[test_case("http://x.com/a.json", "http://other.com/b.json", "http://other.com/b.json"; "foreign authority stays absolute")]
    #[test_case("http://x.com/a.json", "file:///b.json", "file:///b.json"; "foreign scheme stays absolute")]
    fn relative_identifier_rendering(root: &str, id: &str, expected: &str) {
        let root = Url::parse(root).expect("Invalid URL");
        let id = Url::parse(id).expect("Invalid URL");
        assert_eq!(relative_identifier(&root, &id), expected);
    }

    #[test]
    fn pointer_walks_objects_and_arrays() {
        let document = json!({"a": {"b/c": [{"~d": 1}]}});
        assert_eq!(pointer(&document, "/a/b~1c/0/~0d"), Some(&json!(1)));
        assert_eq!(pointer(&document, "/a/missing"), None);
        assert_eq!(pointer(&document, "/a/b~1c/01"), None);
        assert_eq!(pointer(&document, ""), Some(&document));
    }

    #[test]
    fn pointer_decodes_percent_escapes() {
        let document = json!({"a b": {"x%y": true}});
        assert_eq!(pointer(&document, "/a%20b/x%25y"), Some(&json!(true)));
    }
}
