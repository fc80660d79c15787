//! Blob listing backends.
//!
//! The [`backend::BlobLister`] trait abstracts over where the listing comes
//! from.  [`azure::AzureBlobClient`] talks to Azure Blob Storage over its
//! REST API; [`memory::MemoryBlobStore`] serves a fixed listing for local
//! runs and tests.

pub mod azure;
pub mod backend;
pub mod connection_string;
pub mod memory;
pub mod retry;
pub mod sas;
pub mod shared_key;
