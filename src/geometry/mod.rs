//! Coordinates, reference systems and the coordinate transformation chain.
pub mod chain;
pub mod coordinates;
pub mod crs;
pub mod parser;
pub mod registry;
pub mod simplify;
pub mod writer;
