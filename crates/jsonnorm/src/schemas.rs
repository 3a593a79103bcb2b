//! Loaded schema documents and the per-normalization store.
use std::sync::Arc;

use ahash::AHashMap;
use serde_json::Value;
use url::Url;

use crate::{
    drafts::{is_opaque_keyword, Draft},
    retriever::Retrieve,
    uri, Error,
};

/// One loaded JSON Schema document.
///
/// The identifier is the fragment-less source URL, overridden by the
/// document's own top-level id keyword when present. `contents` is the
/// working copy the normalizer rewrites; `pristine` stays untouched so that
/// pointers, anchors and embedded ids can be located mid-rewrite.
#[derive(Debug)]
pub(crate) struct SchemaFile {
    identifier: Url,
    draft: Draft,
    contents: Value,
    pristine: Value,
}

impl PartialEq for SchemaFile {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}
impl Eq for SchemaFile {}

impl SchemaFile {
    pub(crate) fn new(source: Url, contents: Value) -> Result<SchemaFile, Error> {
        let mut identifier = uri::without_fragment(&source);
        let draft = Draft::detect(&contents, &identifier)?;
        draft.check(&identifier, &contents)?;
        if let Some(id) = draft.id_of(&contents) {
            identifier = uri::without_fragment(&uri::resolve(&identifier, id)?);
        }
        let pristine = contents.clone();
        Ok(SchemaFile {
            identifier,
            draft,
            contents,
            pristine,
        })
    }

    pub(crate) fn identifier(&self) -> &Url {
        &self.identifier
    }

    pub(crate) fn draft(&self) -> Draft {
        self.draft
    }

    pub(crate) fn pristine(&self) -> &Value {
        &self.pristine
    }

    pub(crate) fn take_contents(&mut self) -> Value {
        std::mem::take(&mut self.contents)
    }

    pub(crate) fn restore_contents(&mut self, contents: Value) {
        self.contents = contents;
    }

    /// Scope-aware search for the subobject whose id keyword resolves to
    /// `target`; returns its location as decoded pointer tokens.
    pub(crate) fn locate_id(&self, target: &Url) -> Option<Vec<String>> {
        let mut path = Vec::new();
        locate_id(
            &self.pristine,
            self.draft,
            &self.identifier,
            target,
            &mut path,
        )
    }
}

fn locate_id(
    node: &Value,
    draft: Draft,
    scope: &Url,
    target: &Url,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    match node {
        Value::Object(map) => {
            let resolved = match draft.id_of(node) {
                Some(id) => {
                    let mut resolved = uri::resolve(scope, id).ok()?;
                    uri::strip_trailing_hash(&mut resolved);
                    if resolved == *target {
                        return Some(path.clone());
                    }
                    Some(resolved)
                }
                None => None,
            };
            let scope = resolved.as_ref().unwrap_or(scope);
            for (key, child) in map {
                if is_opaque_keyword(key) {
                    continue;
                }
                path.push(key.clone());
                if let Some(found) = locate_id(child, draft, scope, target, path) {
                    return Some(found);
                }
                path.pop();
            }
            None
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                path.push(index.to_string());
                if let Some(found) = locate_id(item, draft, scope, target, path) {
                    return Some(found);
                }
                path.pop();
            }
            None
        }
        _ => None,
    }
}

/// Per-session registry of loaded files, unique by identifier, in first-load
/// order. The root is always at position 0 and `definitions` entries are
/// emitted in this order.
pub(crate) struct SchemaStore {
    files: Vec<SchemaFile>,
    // Requested URLs and file identifiers, both mapped to positions: a
    // document's id keyword may differ from the URL it was fetched under.
    positions: AHashMap<Url, usize>,
    normalized: Vec<bool>,
    allow_remote: bool,
    retriever: Arc<dyn Retrieve>,
}

impl SchemaStore {
    pub(crate) fn new(
        root: SchemaFile,
        allow_remote: bool,
        retriever: Arc<dyn Retrieve>,
    ) -> SchemaStore {
        let mut positions = AHashMap::new();
        positions.insert(root.identifier.clone(), 0);
        SchemaStore {
            files: vec![root],
            positions,
            normalized: vec![false],
            allow_remote,
            retriever,
        }
    }

    pub(crate) fn root_id(&self) -> &Url {
        self.files[0].identifier()
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn file(&self, index: usize) -> &SchemaFile {
        &self.files[index]
    }

    pub(crate) fn file_mut(&mut self, index: usize) -> &mut SchemaFile {
        &mut self.files[index]
    }

    pub(crate) fn position(&self, identifier: &Url) -> Option<usize> {
        self.positions.get(identifier).copied()
    }

    pub(crate) fn is_normalized(&self, index: usize) -> bool {
        self.normalized[index]
    }

    pub(crate) fn mark_normalized(&mut self, index: usize) {
        self.normalized[index] = true;
    }

    /// The already loaded file for `identifier`, or a freshly loaded one when
    /// the remote policy admits it.
    pub(crate) fn get_loaded(&mut self, identifier: &Url) -> Result<usize, Error> {
        if let Some(index) = self.position(identifier) {
            return Ok(index);
        }
        if !self.allow_remote {
            return Err(Error::distributed_schema(identifier.as_str()));
        }
        let contents = self
            .retriever
            .retrieve(identifier)
            .map_err(|error| Error::invalid_reference(identifier.as_str(), Some(error)))?;
        let file = SchemaFile::new(identifier.clone(), contents)?;
        let index = self.files.len();
        self.positions.insert(identifier.clone(), index);
        self.positions.insert(file.identifier.clone(), index);
        self.files.push(file);
        self.normalized.push(false);
        Ok(index)
    }

    /// Search every loaded file (preferring `preferred`) for a subobject
    /// whose id resolves to `target`.
    pub(crate) fn locate_embedded(
        &self,
        preferred: usize,
        target: &Url,
    ) -> Option<(usize, Vec<String>)> {
        if let Some(path) = self.files[preferred].locate_id(target) {
            return Some((preferred, path));
        }
        self.files
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != preferred)
            .find_map(|(index, file)| file.locate_id(target).map(|path| (index, path)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;

    use super::SchemaFile;

    fn file(source: &str, contents: serde_json::Value) -> SchemaFile {
        SchemaFile::new(Url::parse(source).expect("Invalid URL"), contents)
            .expect("Invalid schema file")
    }

    #[test]
    fn identifier_strips_the_fragment() {
        let file = file("http://example.com/a.json#", json!({"type": "object"}));
        assert_eq!(file.identifier().as_str(), "http://example.com/a.json");
    }

    #[test]
    fn top_level_id_overrides_the_source() {
        let file = file(
            "file:///tmp/a.json",
            json!({"$id": "http://example.com/tree", "type": "object"}),
        );
        assert_eq!(file.identifier().as_str(), "http://example.com/tree");
    }

    #[test]
    fn relative_top_level_id_resolves_against_the_source() {
        let file = file(
            "http://example.com/dir/a.json",
            json!({"$id": "b.json", "type": "object"}),
        );
        assert_eq!(file.identifier().as_str(), "http://example.com/dir/b.json");
    }

    #[test]
    fn locate_id_follows_base_changes() {
        let file = file(
            "http://localhost:1234/root.json",
            json!({
                "$id": "http://localhost:1234/root.json",
                "definitions": {
                    "A": {
                        "$id": "nested.json",
                        "definitions": {
                            "B": {"$id": "#foo", "type": "integer"}
                        }
                    }
                }
            }),
        );
        let target = Url::parse("http://localhost:1234/nested.json").expect("Invalid URL");
        assert_eq!(
            file.locate_id(&target),
            Some(vec!["definitions".to_string(), "A".to_string()])
        );
        let anchor = Url::parse("http://localhost:1234/nested.json#foo").expect("Invalid URL");
        assert_eq!(
            file.locate_id(&anchor),
            Some(vec![
                "definitions".to_string(),
                "A".to_string(),
                "definitions".to_string(),
                "B".to_string()
            ])
        );
    }

    #[test]
    fn ids_inside_enums_are_not_located() {
        let file = file(
            "http://example.com/a.json",
            json!({"enum": [{"$id": "http://example.com/fake"}], "$id": "http://example.com/a.json"}),
        );
        let target = Url::parse("http://example.com/fake").expect("Invalid URL");
        assert_eq!(file.locate_id(&target), None);
    }
}
