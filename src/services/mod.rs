//! The chunked object store, bottom-up: pure chunk codec, the two table
//! handles, the writer / copier / reader built on them, and the
//! [`grid_store::GridStore`] facade tying them together.

pub mod chunk_codec;
pub mod chunk_store;
pub mod copier;
pub mod errors;
pub mod grid_store;
pub mod metadata_store;
pub mod reader;
pub mod writer;
