/// Decode/encode of object addresses under both schemes.
pub mod address;
