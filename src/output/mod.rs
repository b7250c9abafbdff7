pub mod line_buffer;
pub mod normalize;
pub mod step_parser;
pub mod types;

pub use line_buffer::LineBuffer;
pub use step_parser::{GlyphTable, ParserEvent, StepOutputParser};
pub use types::*;
