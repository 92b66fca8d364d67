pub mod label;
pub mod record;

pub use label::*;
pub use record::*;
