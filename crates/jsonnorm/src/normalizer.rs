//! Schema normalization: reference resolution, inlining and rewriting.
//!
//! The traversal keeps the resolution scope explicitly: every object that
//! carries an id keyword rebases the scope for its subtree, so a relative
//! `$ref` deep inside a document can resolve somewhere other than the
//! document's own identifier. External documents are loaded through the
//! store, queued, and rewritten in their own right; the assembled output
//! carries them under a synthetic top-level `definitions` map.
use std::{borrow::Cow, collections::VecDeque, sync::Arc};

use serde_json::{Map, Value};
use url::Url;

use crate::{
    drafts::{is_opaque_keyword, Draft},
    retriever::{DefaultRetriever, Retrieve},
    schemas::{SchemaFile, SchemaStore},
    uri, Error,
};

/// Configuration for a normalization session.
///
/// ```
/// use jsonnorm::NormalizeOptions;
/// use serde_json::json;
/// use url::Url;
///
/// let schema = json!({"$ref": "#/definitions/positive", "definitions": {
///     "positive": {"type": "integer", "minimum": 1}
/// }});
/// let base = Url::parse("file:///schemas/positive.json").unwrap();
/// let normalized = NormalizeOptions::new().normalize(&schema, &base).unwrap();
/// assert_eq!(normalized["$ref"], json!("#/definitions/positive"));
/// ```
pub struct NormalizeOptions {
    allow_remote: bool,
    retriever: Arc<dyn Retrieve>,
}

impl NormalizeOptions {
    #[must_use]
    pub fn new() -> NormalizeOptions {
        NormalizeOptions {
            allow_remote: false,
            retriever: Arc::new(DefaultRetriever),
        }
    }

    /// Allow documents that are not yet loaded to be fetched. Off by default:
    /// a reference that leaves the document then fails with
    /// [`Error::DistributedSchema`].
    #[must_use]
    pub fn allow_remote(mut self, allow_remote: bool) -> NormalizeOptions {
        self.allow_remote = allow_remote;
        self
    }

    /// Replace the retriever used for external documents.
    #[must_use]
    pub fn retriever(mut self, retriever: Arc<dyn Retrieve>) -> NormalizeOptions {
        self.retriever = retriever;
        self
    }

    /// Normalize `contents`, addressed by the absolute `base` identifier,
    /// into a single self-contained document.
    ///
    /// # Errors
    ///
    /// See [`Error`]; any error aborts the normalization of this schema.
    pub fn normalize(&self, contents: &Value, base: &Url) -> Result<Value, Error> {
        let root = SchemaFile::new(base.clone(), contents.clone())?;
        let mut store = SchemaStore::new(root, self.allow_remote, Arc::clone(&self.retriever));
        let mut queue: VecDeque<usize> = VecDeque::new();
        queue.push_back(0);

        while let Some(index) = queue.pop_front() {
            if store.is_normalized(index) {
                continue;
            }
            store.mark_normalized(index);
            let mut contents = store.file_mut(index).take_contents();
            let scope = store.file(index).identifier().clone();
            Walker {
                store: &mut store,
                index,
                queue: &mut queue,
            }
            .walk(&mut contents, &scope)?;
            store.file_mut(index).restore_contents(contents);
        }

        Ok(assemble(&mut store))
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize with the default options: no remote fetching.
///
/// # Errors
///
/// See [`NormalizeOptions::normalize`].
pub fn normalize(contents: &Value, base: &Url) -> Result<Value, Error> {
    NormalizeOptions::new().normalize(contents, base)
}

struct Walker<'a> {
    store: &'a mut SchemaStore,
    index: usize,
    queue: &'a mut VecDeque<usize>,
}

impl Walker<'_> {
    fn walk(&mut self, node: &mut Value, scope: &Url) -> Result<(), Error> {
        let draft = self.store.file(self.index).draft();
        let scope = match draft.id_of(node) {
            Some(id) => {
                let mut rebased = uri::resolve(scope, id)?;
                uri::strip_trailing_hash(&mut rebased);
                Cow::Owned(rebased)
            }
            None => Cow::Borrowed(scope),
        };
        match node {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if is_opaque_keyword(key) {
                        continue;
                    }
                    self.walk(child, &scope)?;
                }
                let reference = map.get("$ref").and_then(Value::as_str).map(String::from);
                if let Some(reference) = reference {
                    let rewritten = self.rewrite_ref(&reference, &scope)?;
                    map.insert("$ref".to_string(), Value::String(rewritten));
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, &scope)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn rewrite_ref(&mut self, reference: &str, scope: &Url) -> Result<String, Error> {
        let resolved = uri::resolve(scope, reference)?;
        let fragment = resolved.fragment().unwrap_or("").to_string();
        let base = uri::without_fragment(&resolved);

        let target = if base == *self.store.file(self.index).identifier() {
            self.index
        } else if let Some(index) = self.store.position(&base) {
            index
        } else if let Some((index, prefix_path)) = self.store.locate_embedded(self.index, &base) {
            // The base names a subobject with its own id rather than a whole
            // file; the fragment applies inside that subobject.
            return self.render_within(index, prefix_path, &fragment, &resolved);
        } else {
            let index = self.store.get_loaded(&base)?;
            self.queue.push_back(index);
            index
        };
        self.render_within(target, Vec::new(), &fragment, &resolved)
    }

    /// Render a rewritten `$ref` addressing the subobject of file `index`
    /// located at `prefix_path` (empty for the file's top level).
    fn render_within(
        &self,
        index: usize,
        mut prefix_path: Vec<String>,
        fragment: &str,
        resolved: &Url,
    ) -> Result<String, Error> {
        let file = self.store.file(index);
        if fragment.is_empty() {
            return Ok(self.prefix(index) + &uri::fragment_from_tokens(&prefix_path));
        }
        if fragment.starts_with('/') {
            let tokens = uri::fragment_tokens(fragment).ok_or_else(|| {
                Error::invalid_fragment(format!("#{fragment}"), file.identifier().as_str())
            })?;
            prefix_path.extend(tokens);
            if uri::lookup(file.pristine(), &prefix_path).is_none() {
                return Err(Error::invalid_fragment(
                    format!("#{fragment}"),
                    file.identifier().as_str(),
                ));
            }
            return Ok(self.prefix(index) + &uri::fragment_from_tokens(&prefix_path));
        }
        // A plain-name fragment addresses the subobject whose id resolves to
        // the full reference URI.
        match file.locate_id(resolved) {
            Some(path) => Ok(self.prefix(index) + &uri::fragment_from_tokens(&path)),
            None => Err(Error::invalid_fragment(
                format!("#{fragment}"),
                file.identifier().as_str(),
            )),
        }
    }

    fn prefix(&self, index: usize) -> String {
        if index == 0 {
            "#".to_string()
        } else {
            let relative =
                uri::relative_identifier(self.store.root_id(), self.store.file(index).identifier());
            format!("#/definitions/{}", uri::escape_token(&relative))
        }
    }
}

/// Strip consumed id keywords and attach the loaded files to the root's
/// `definitions`, in load order.
fn assemble(store: &mut SchemaStore) -> Value {
    let root_id = store.root_id().clone();
    let mut root = store.file_mut(0).take_contents();
    strip_ids(&mut root, store.file(0).draft());

    let mut definitions: Vec<(String, Value)> = Vec::new();
    for index in 1..store.len() {
        let mut contents = store.file_mut(index).take_contents();
        strip_ids(&mut contents, store.file(index).draft());
        if let Value::Object(map) = &mut contents {
            // The root's `$schema` is the only one that survives.
            map.remove("$schema");
        }
        let identifier = store.file(index).identifier();
        definitions.push((uri::relative_identifier(&root_id, identifier), contents));
    }

    if !definitions.is_empty() {
        if let Value::Object(map) = &mut root {
            let entry = map
                .entry("definitions")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(existing) = entry {
                for (key, value) in definitions {
                    existing.insert(key, value);
                }
            }
        }
    }
    root
}

fn strip_ids(node: &mut Value, draft: Draft) {
    match node {
        Value::Object(map) => {
            if map.get(draft.id_keyword()).is_some_and(Value::is_string) {
                map.remove(draft.id_keyword());
            }
            for (key, child) in map.iter_mut() {
                if is_opaque_keyword(key) {
                    continue;
                }
                strip_ids(child, draft);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_ids(item, draft);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;

    use super::normalize;

    fn base() -> Url {
        Url::parse("file:///schemas/root.json").expect("Invalid URL")
    }

    #[test]
    fn ref_to_root_stays_put() {
        let schema = json!({"$ref": "#"});
        assert_eq!(normalize(&schema, &base()).expect("Normalization failed"), schema);
    }

    #[test]
    fn scope_changes_rewrite_to_the_inner_target() {
        let schema = json!({
            "$id": "http://localhost:1234/root.json",
            "allOf": [{"$ref": "http://localhost:1234/nested.json#foo"}],
            "definitions": {
                "A": {
                    "$id": "nested.json",
                    "definitions": {
                        "B": {"$id": "#foo", "type": "integer"}
                    }
                }
            }
        });
        let normalized = normalize(&schema, &base()).expect("Normalization failed");
        assert_eq!(
            normalized["allOf"][0]["$ref"],
            json!("#/definitions/A/definitions/B")
        );
        // Consumed ids are gone.
        assert_eq!(normalized["definitions"]["A"].get("$id"), None);
    }

    #[test]
    fn dangling_pointer_is_an_invalid_fragment() {
        let schema = json!({"$ref": "#/definitions/missing"});
        let error = normalize(&schema, &base()).expect_err("Should fail");
        assert!(error.to_string().contains("/definitions/missing"));
    }
}
