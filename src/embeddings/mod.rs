// Embeddings module
// This module handles DeepInfra integration for chunk and query embeddings

pub mod deepinfra;

pub use deepinfra::{DeepInfraClient, EMBEDDING_SERVICE};
