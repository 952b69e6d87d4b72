/// Object addressing and line hashing.
pub mod common;




/// Whole-system scenarios, coherence across lanes and trace replay.
pub mod sim;
