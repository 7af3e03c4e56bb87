use bitflags::bitflags;

bitflags! {
    /// Input-format features. Each independently toggles a parser
    /// behaviour; renderer concerns are not represented here.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Features: u32 {
        const TABLES = 1 << 0;
        const FENCED = 1 << 1;
        const FOOTNOTES = 1 << 2;
        const AUTOLINK = 1 << 3;
        const STRIKE = 1 << 4;
        const HILITE = 1 << 5;
        const SUPER = 1 << 6;
        const MATH = 1 << 7;
        /// Disable emphasis within words for `_`.
        const NOINTEM = 1 << 8;
        /// Disable 4-space indented code blocks.
        const NOCODEIND = 1 << 9;
        const METADATA = 1 << 10;
        const COMMONMARK = 1 << 11;
        const DEFLIST = 1 << 12;
        /// `{width=... height=...}` attributes after images.
        const IMG_EXT = 1 << 13;
    }
}

/// A metadata key/value pair supplied from outside the document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

impl MetaEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParseOptions {
    pub features: Features,
    /// Maximum parse tree depth; 0 disables the check.
    pub maxdepth: usize,
    /// Defaults: overridden by keys present in the document.
    pub meta: Vec<MetaEntry>,
    /// Overrides: replace values of matching document keys.
    pub metaovr: Vec<MetaEntry>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self {
            features: Features::empty(),
            maxdepth: 128,
            meta: Vec::new(),
            metaovr: Vec::new(),
        }
    }

    pub fn with_features(features: Features) -> Self {
        Self {
            features,
            ..Self::new()
        }
    }
}
