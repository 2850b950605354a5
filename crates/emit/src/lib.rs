//! Emission: binary chunks and readable listings.

pub mod listing;
pub mod writer;

pub use listing::render_listing;
pub use writer::write_image;
