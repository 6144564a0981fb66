//! Byte-level file format handling

pub mod fsb;
