//! Repository layer: stateless structs whose methods take a pool.

pub mod completion_repo;

pub use completion_repo::CompletionRepo;
