//! Draft detection and the per-draft keyword model.
use serde_json::Value;
use url::Url;

use crate::{meta, Error};

/// JSON Schema specification versions understood by the normalizer.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Draft {
    /// JSON Schema Draft 4
    #[default]
    Draft4,
    /// JSON Schema Draft 6
    Draft6,
    /// JSON Schema Draft 7
    Draft7,
}

impl Draft {
    /// Detect the draft of a document: its `$schema` when declared, otherwise
    /// inferred — a document using `$id` anywhere is treated as Draft 7,
    /// everything else as Draft 4.
    pub fn detect(contents: &Value, identifier: &Url) -> Result<Draft, Error> {
        if let Some(declared) = contents
            .as_object()
            .and_then(|contents| contents.get("$schema"))
            .and_then(Value::as_str)
        {
            match draft_from_url(declared.trim_end_matches('#')) {
                Some(draft) => Ok(draft),
                None => Err(Error::draft_validation(
                    identifier.as_str(),
                    declared.to_string(),
                )),
            }
        } else if contains_dollar_id(contents) {
            Ok(Draft::Draft7)
        } else {
            Ok(Draft::Draft4)
        }
    }

    /// The keyword that introduces a new resolution scope.
    pub(crate) fn id_keyword(self) -> &'static str {
        match self {
            Draft::Draft4 => "id",
            Draft::Draft6 | Draft::Draft7 => "$id",
        }
    }

    /// The identifier of a schema object, when it has one. Only string values
    /// count, and `$ref` suppresses its siblings in these drafts.
    pub(crate) fn id_of(self, contents: &Value) -> Option<&str> {
        let object = contents.as_object()?;
        if object.contains_key("$ref") {
            return None;
        }
        object.get(self.id_keyword()).and_then(Value::as_str)
    }

    /// Canonical `$schema` URL of this draft.
    pub fn schema_url(self) -> &'static str {
        match self {
            Draft::Draft4 => "http://json-schema.org/draft-04/schema#",
            Draft::Draft6 => "http://json-schema.org/draft-06/schema#",
            Draft::Draft7 => "http://json-schema.org/draft-07/schema#",
        }
    }

    /// Validate a document against this draft's metaschema.
    pub(crate) fn check(self, identifier: &Url, contents: &Value) -> Result<(), Error> {
        if meta::validator(self).is_valid(contents) {
            Ok(())
        } else {
            Err(Error::draft_validation(
                identifier.as_str(),
                self.schema_url().to_string(),
            ))
        }
    }
}

fn draft_from_url(url: &str) -> Option<Draft> {
    match url {
        "http://json-schema.org/draft-07/schema" => Some(Draft::Draft7),
        "http://json-schema.org/draft-06/schema" => Some(Draft::Draft6),
        "http://json-schema.org/draft-04/schema" => Some(Draft::Draft4),
        _ => None,
    }
}

/// `enum` and `const` hold instance data; ids inside them are not schema ids.
pub(crate) fn is_opaque_keyword(keyword: &str) -> bool {
    keyword == "enum" || keyword == "const"
}

fn contains_dollar_id(contents: &Value) -> bool {
    match contents {
        Value::Object(map) => {
            if map.get("$id").is_some_and(Value::is_string) {
                return true;
            }
            map.iter()
                .filter(|(key, _)| !is_opaque_keyword(key))
                .any(|(_, value)| contains_dollar_id(value))
        }
        Value::Array(items) => items.iter().any(contains_dollar_id),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use test_case::test_case;
    use url::Url;

    use super::Draft;

    fn detect(contents: &Value) -> Draft {
        let identifier = Url::parse("http://example.com/schema.json").expect("Invalid URL");
        Draft::detect(contents, &identifier).expect("Detection failed")
    }

    #[test_case(&json!({"$schema": "http://json-schema.org/draft-07/schema#"}), Draft::Draft7)]
    #[test_case(&json!({"$schema": "http://json-schema.org/draft-06/schema#"}), Draft::Draft6)]
    #[test_case(&json!({"$schema": "http://json-schema.org/draft-04/schema#"}), Draft::Draft4)]
    #[test_case(&json!({"$schema": "http://json-schema.org/draft-04/schema"}), Draft::Draft4; "no trailing hash")]
    #[test_case(&json!({}), Draft::Draft4; "no schema key defaults to draft 4")]
    #[test_case(&json!({"properties": {"x": {"$id": "#x"}}}), Draft::Draft7; "dollar id implies a higher draft")]
    #[test_case(&json!({"enum": [{"$id": "#x"}]}), Draft::Draft4; "dollar id inside enum is data")]
    #[test_case(&json!({"properties": {"$id": {"type": "object"}}}), Draft::Draft4; "property named dollar id is not an id")]
    fn detection(contents: &Value, expected: Draft) {
        assert_eq!(detect(contents), expected);
    }

    #[test]
    fn unknown_schema_url_is_rejected() {
        let identifier = Url::parse("http://example.com/schema.json").expect("Invalid URL");
        let error = Draft::detect(
            &json!({"$schema": "https://json-schema.org/draft/2020-12/schema"}),
            &identifier,
        )
        .expect_err("Should fail");
        assert!(error.to_string().contains("2020-12"));
    }

    #[test_case(Draft::Draft4, &json!({"id": "http://x.com/a"}), Some("http://x.com/a"))]
    #[test_case(Draft::Draft7, &json!({"id": "http://x.com/a"}), None; "legacy keyword in a higher draft")]
    #[test_case(Draft::Draft7, &json!({"$id": "http://x.com/a"}), Some("http://x.com/a"))]
    #[test_case(Draft::Draft7, &json!({"$id": "http://x.com/a", "$ref": "#/definitions/a"}), None; "ref suppresses the id")]
    #[test_case(Draft::Draft7, &json!({"$id": 42}), None; "non-string id")]
    fn id_extraction(draft: Draft, contents: &Value, expected: Option<&str>) {
        assert_eq!(draft.id_of(contents), expected);
    }

    #[test]
    fn metaschema_check() {
        let identifier = Url::parse("http://example.com/schema.json").expect("Invalid URL");
        Draft::Draft7
            .check(&identifier, &json!({"type": "object"}))
            .expect("Valid schema");
        let error = Draft::Draft7
            .check(&identifier, &json!({"type": 42}))
            .expect_err("Should fail");
        assert!(error.to_string().contains("draft-07"));
    }
}
