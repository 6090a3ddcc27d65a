pub mod csv;

pub use csv::{decode, decode_path, decode_str, DecodeError};
