//! Derive macros for the simnet crate.
//!
//! Provides:
//! - `#[derive(BinaryCodec)]` - deterministic binary `Encode`/`Decode` impls
//! - `#[derive(Error)]` - `Display`, `Error` and `From` impls for error enums

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` for structs and enums.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error`, plus `From` for variants marked `#[from]`.
#[proc_macro_derive(Error, attributes(error, from))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
