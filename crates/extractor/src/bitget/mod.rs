pub mod rest;
pub mod signer;

pub use rest::BitgetClient;
pub use signer::{RequestSigner, SignedHeaders};
