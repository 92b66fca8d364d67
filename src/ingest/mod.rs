/// Loading of exported journal records
///
/// Accepts a JSON array of objects or JSON lines as produced by
/// `journalctl -o json`.

pub mod reader;

pub use reader::{common_keys, parse_records, read_records, InputFormat};
