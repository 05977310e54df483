use once_cell::sync::Lazy;
use regex::Regex;

pub const KEY_ID: &str = "id";
pub const KEY_TITLE: &str = "title";
pub const KEY_ROLE: &str = "role";
pub const KEY_SYNTAX: &str = "syntax";
pub const KEY_TAGS: &str = "tags";
pub const KEY_URL: &str = "url";
pub const KEY_CREATED: &str = "created";
pub const KEY_MODIFIED: &str = "modified";
pub const KEY_PRECURSOR: &str = "precursor";
pub const KEY_FOLGE: &str = "folge";
pub const KEY_SUPERIOR: &str = "superior";
pub const KEY_SUBORDINATES: &str = "subordinates";
pub const KEY_PREDECESSOR: &str = "predecessor";
pub const KEY_SUCCESSORS: &str = "successors";
pub const KEY_BACK: &str = "back";
pub const KEY_BACKWARD: &str = "backward";
pub const KEY_DEAD: &str = "dead";
pub const KEY_FORWARD: &str = "forward";
pub const KEY_CONTENT_TAGS: &str = "content-tags";
pub const KEY_ALL_TAGS: &str = "all-tags";
pub const KEY_USELESS_FILES: &str = "useless-files";

static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid key regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Id,
    IdSet,
    Number,
    String,
    TagSet,
    Timestamp,
    Url,
    Word,
    WordSet,
    Zettelmarkup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDescription {
    pub key_type: KeyType,
    /// Values are derived by the store and never written to disk or indexed.
    pub computed: bool,
    /// Key under which the referenced zettel reports the reverse edge.
    pub inverse: Option<&'static str>,
}

impl KeyDescription {
    const fn user(key_type: KeyType) -> Self {
        Self {
            key_type,
            computed: false,
            inverse: None,
        }
    }

    const fn computed(key_type: KeyType) -> Self {
        Self {
            key_type,
            computed: true,
            inverse: None,
        }
    }

    const fn with_inverse(key_type: KeyType, inverse: &'static str) -> Self {
        Self {
            key_type,
            computed: false,
            inverse: Some(inverse),
        }
    }
}

const REGISTERED: &[(&str, KeyDescription)] = &[
    (KEY_ID, KeyDescription::computed(KeyType::Id)),
    (KEY_TITLE, KeyDescription::user(KeyType::Zettelmarkup)),
    (KEY_ROLE, KeyDescription::user(KeyType::Word)),
    (KEY_SYNTAX, KeyDescription::user(KeyType::Word)),
    (KEY_TAGS, KeyDescription::user(KeyType::TagSet)),
    (KEY_URL, KeyDescription::user(KeyType::Url)),
    (KEY_CREATED, KeyDescription::user(KeyType::Timestamp)),
    (KEY_MODIFIED, KeyDescription::user(KeyType::Timestamp)),
    (KEY_PRECURSOR, KeyDescription::with_inverse(KeyType::IdSet, KEY_FOLGE)),
    (KEY_SUPERIOR, KeyDescription::with_inverse(KeyType::IdSet, KEY_SUBORDINATES)),
    (KEY_PREDECESSOR, KeyDescription::with_inverse(KeyType::Id, KEY_SUCCESSORS)),
    (KEY_FOLGE, KeyDescription::computed(KeyType::IdSet)),
    (KEY_SUBORDINATES, KeyDescription::computed(KeyType::IdSet)),
    (KEY_SUCCESSORS, KeyDescription::computed(KeyType::IdSet)),
    (KEY_BACK, KeyDescription::computed(KeyType::IdSet)),
    (KEY_BACKWARD, KeyDescription::computed(KeyType::IdSet)),
    (KEY_DEAD, KeyDescription::computed(KeyType::IdSet)),
    (KEY_FORWARD, KeyDescription::computed(KeyType::IdSet)),
    (KEY_CONTENT_TAGS, KeyDescription::computed(KeyType::TagSet)),
    (KEY_ALL_TAGS, KeyDescription::computed(KeyType::TagSet)),
    (KEY_USELESS_FILES, KeyDescription::computed(KeyType::String)),
];

pub fn is_valid_key(key: &str) -> bool {
    KEY_RE.is_match(key)
}

/// Description of a registered key, or one derived from the key's suffix.
pub fn describe(key: &str) -> KeyDescription {
    if let Some((_, description)) = REGISTERED.iter().find(|(name, _)| *name == key) {
        return *description;
    }
    let key_type = if key.ends_with("-zid") {
        KeyType::Id
    } else if key.ends_with("-zids") {
        KeyType::IdSet
    } else if key.ends_with("-url") {
        KeyType::Url
    } else if key.ends_with("-date") {
        KeyType::Timestamp
    } else if key.ends_with("-title") {
        KeyType::Zettelmarkup
    } else if key.ends_with("-role") {
        KeyType::Word
    } else if key.ends_with("-set") {
        KeyType::WordSet
    } else if key.ends_with("-number") {
        KeyType::Number
    } else {
        KeyType::String
    };
    KeyDescription::user(key_type)
}

pub fn key_type(key: &str) -> KeyType {
    describe(key).key_type
}

pub fn is_computed(key: &str) -> bool {
    describe(key).computed
}

pub fn inverse_key(key: &str) -> Option<&'static str> {
    describe(key).inverse
}

/// Splits a multi-valued metadata value into its elements.
pub fn list_from_value(value: &str) -> impl Iterator<Item = &str> {
    value.split_whitespace()
}
