//! Recursion classification over a normalized document.
//!
//! The walk follows the validation applicators only; `definitions` content
//! is reachable through `$ref` alone, so unused definitions never affect the
//! classification. Each edge either crosses a guard (the instance may legally
//! omit or avoid the branch) or not; a cycle all of whose edges are unguarded
//! admits no finite instance.
use ahash::AHashMap;
use serde_json::Value;

use crate::{uri, Error};

/// Recursion classification of a normalized schema.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Recursion {
    /// The reference graph has no cycle.
    None,
    /// Every cycle crosses at least one guard.
    Guarded,
    /// Some cycle crosses no guard at all.
    Unguarded,
}

/// Classify the recursion of a normalized document.
///
/// # Errors
///
/// [`Error::InvalidReference`] when a `$ref` is not a local pointer or does
/// not resolve within the document.
pub fn check_recursion(document: &Value) -> Result<Recursion, Error> {
    Checker {
        root: document,
        in_progress: AHashMap::new(),
        explored: AHashMap::new(),
        worst: Recursion::None,
    }
    .check()
}

struct Checker<'a> {
    root: &'a Value,
    // Ref targets on the current path, with the guard count at their entry.
    // A re-entry with an unchanged count closed a guard-free cycle.
    in_progress: AHashMap<String, usize>,
    // Explored targets, keyed to the lowest guard count they were entered
    // with. An entry below that count can close less-guarded cycles onto the
    // current path, so the target is walked again.
    explored: AHashMap<String, usize>,
    worst: Recursion,
}

impl<'a> Checker<'a> {
    fn check(mut self) -> Result<Recursion, Error> {
        self.in_progress.insert(String::new(), 0);
        self.visit(self.root, 0)?;
        Ok(self.worst)
    }

    fn upgrade(&mut self, found: Recursion) {
        if found > self.worst {
            self.worst = found;
        }
    }

    fn visit(&mut self, node: &'a Value, guards: usize) -> Result<(), Error> {
        if self.worst == Recursion::Unguarded {
            return Ok(());
        }
        let Value::Object(map) = node else {
            return Ok(());
        };
        if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
            // Siblings of `$ref` are ignored in these drafts.
            return self.follow_ref(reference, guards);
        }

        for keyword in ["allOf", "anyOf", "oneOf"] {
            if let Some(Value::Array(items)) = map.get(keyword) {
                // `allOf` branches are mandatory; the others can be not-taken.
                let guarded = keyword != "allOf";
                for item in items {
                    self.visit(item, guards + usize::from(guarded))?;
                }
            }
        }
        if let Some(Value::Object(properties)) = map.get("properties") {
            let required: Vec<&str> = map
                .get("required")
                .and_then(Value::as_array)
                .map(|names| names.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            for (name, subschema) in properties {
                let guarded = !required.contains(&name.as_str());
                self.visit(subschema, guards + usize::from(guarded))?;
            }
        }
        if let Some(Value::Object(patterns)) = map.get("patternProperties") {
            for subschema in patterns.values() {
                self.visit(subschema, guards + 1)?;
            }
        }
        for keyword in ["additionalProperties", "additionalItems"] {
            if let Some(subschema) = map.get(keyword) {
                if subschema.is_object() {
                    self.visit(subschema, guards + 1)?;
                }
            }
        }
        if let Some(items) = map.get("items") {
            let min_items = map.get("minItems").and_then(Value::as_u64).unwrap_or(0);
            match items {
                // A tuple position below `minItems` is forced to exist.
                Value::Array(tuple) => {
                    for (position, subschema) in tuple.iter().enumerate() {
                        let guarded = position as u64 >= min_items;
                        self.visit(subschema, guards + usize::from(guarded))?;
                    }
                }
                Value::Object(_) => {
                    self.visit(items, guards + usize::from(min_items == 0))?;
                }
                _ => {}
            }
        }
        for keyword in ["not", "if", "then", "else", "contains", "propertyNames"] {
            if let Some(subschema) = map.get(keyword) {
                if subschema.is_object() {
                    self.visit(subschema, guards)?;
                }
            }
        }
        if let Some(Value::Object(dependencies)) = map.get("dependencies") {
            for dependency in dependencies.values() {
                // Only the schema form; string arrays carry no subschema.
                if dependency.is_object() {
                    self.visit(dependency, guards)?;
                }
            }
        }
        Ok(())
    }

    fn follow_ref(&mut self, reference: &str, guards: usize) -> Result<(), Error> {
        let Some(fragment) = reference.strip_prefix('#') else {
            return Err(Error::invalid_reference(reference, None));
        };
        let tokens = uri::fragment_tokens(fragment)
            .ok_or_else(|| Error::invalid_reference(reference, None))?;
        let target = uri::lookup(self.root, &tokens)
            .ok_or_else(|| Error::invalid_reference(reference, None))?;
        let key = uri::fragment_from_tokens(&tokens);
        if let Some(&entry) = self.in_progress.get(&key) {
            if guards > entry {
                self.upgrade(Recursion::Guarded);
            } else {
                self.upgrade(Recursion::Unguarded);
            }
            return Ok(());
        }
        if let Some(&lowest) = self.explored.get(&key) {
            if guards >= lowest {
                return Ok(());
            }
        }
        self.in_progress.insert(key.clone(), guards);
        self.visit(target, guards)?;
        self.in_progress.remove(&key);
        self.explored
            .entry(key)
            .and_modify(|lowest| *lowest = (*lowest).min(guards))
            .or_insert(guards);
        Ok(())
    }
}
