mod attributes;
mod parser;
mod playlist;
mod resolve;

pub use attributes::Attributes;
pub use parser::{parse, ParseError, ParseResult};
pub use playlist::*;
pub use resolve::*;
