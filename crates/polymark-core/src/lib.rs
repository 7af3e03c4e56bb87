mod ast;
mod autolink;
mod config;
mod error;
mod metadata;
mod parser;
mod prepass;

pub use ast::{
    AutolinkKind, CellFlags, ListFlags, Node, NodeId, NodeKind, PostOrder, Tree,
};
pub use config::{Features, MetaEntry, ParseOptions};
pub use error::ParseError;
pub use parser::{ParseResult, Parser, parse};
