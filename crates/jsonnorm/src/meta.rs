//! Embedded metaschemas for the supported drafts.
use once_cell::sync::Lazy;

use crate::Draft;

macro_rules! schema {
    ($name:ident, $path:expr) => {
        pub(crate) static $name: once_cell::sync::Lazy<serde_json::Value> =
            once_cell::sync::Lazy::new(|| {
                serde_json::from_slice(include_bytes!($path)).expect("Invalid metaschema")
            });
    };
}

schema!(DRAFT4, "../metaschemas/draft4.json");
schema!(DRAFT6, "../metaschemas/draft6.json");
schema!(DRAFT7, "../metaschemas/draft7.json");

static DRAFT4_VALIDATOR: Lazy<jsonschema::Validator> =
    Lazy::new(|| jsonschema::validator_for(&DRAFT4).expect("Invalid metaschema"));
static DRAFT6_VALIDATOR: Lazy<jsonschema::Validator> =
    Lazy::new(|| jsonschema::validator_for(&DRAFT6).expect("Invalid metaschema"));
static DRAFT7_VALIDATOR: Lazy<jsonschema::Validator> =
    Lazy::new(|| jsonschema::validator_for(&DRAFT7).expect("Invalid metaschema"));

pub(crate) fn validator(draft: Draft) -> &'static jsonschema::Validator {
    match draft {
        Draft::Draft4 => &DRAFT4_VALIDATOR,
        Draft::Draft6 => &DRAFT6_VALIDATOR,
        Draft::Draft7 => &DRAFT7_VALIDATOR,
    }
}
