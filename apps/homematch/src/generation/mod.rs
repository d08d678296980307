// Listing generation: prompt the gateway for synthetic listings, validate
// them, and ingest their text chunks into the vector index.

pub mod generator;
pub mod prompts;
pub mod splitter;

pub use generator::ListingGenerator;
