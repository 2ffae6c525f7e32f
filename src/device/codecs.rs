/// Newline delimited text framing.
pub mod lines;
