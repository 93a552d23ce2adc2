//! Derive macro for the deterministic binary codec.
//!
//! Struct fields are encoded in declaration order with no framing. Enums
//! write a `u8` variant tag (declaration index) followed by the variant's
//! fields. The generated impls target `crate::types::encoding`, so the macro
//! is only usable inside the simnet crate.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => {
            if data.variants.len() > u8::MAX as usize + 1 {
                return syn::Error::new_spanned(&input, "BinaryCodec supports at most 256 variants")
                    .to_compile_error()
                    .into();
            }
            let mut encode_arms = Vec::new();
            let mut decode_arms = Vec::new();
            for (tag, variant) in data.variants.iter().enumerate() {
                let tag = tag as u8;
                let ident = &variant.ident;
                let (pattern, encode_fields, construct) = bind_fields(&variant.fields);
                encode_arms.push(quote! {
                    Self::#ident #pattern => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #encode_fields
                    }
                });
                decode_arms.push(quote! {
                    #tag => Ok(Self::#ident #construct),
                });
            }
            (
                quote! {
                    match self {
                        #(#encode_arms)*
                    }
                },
                quote! {
                    let tag: u8 = crate::types::encoding::Decode::decode(input)?;
                    match tag {
                        #(#decode_arms)*
                        _ => Err(crate::types::encoding::DecodeError::InvalidValue),
                    }
                },
            )
        }
        Data::Union(_) => {
            return syn::Error::new_spanned(&input, "BinaryCodec derive does not support unions")
                .to_compile_error()
                .into();
        }
    };

    quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    }
    .into()
}

fn struct_bodies(fields: &Fields) -> (TokenStream2, TokenStream2) {
    let (pattern, encode_fields, construct) = bind_fields(fields);
    (
        quote! {
            let Self #pattern = self;
            #encode_fields
        },
        quote! { Ok(Self #construct) },
    )
}

/// Returns the destructuring pattern, the per-field encode statements and
/// the constructor expression that decodes each field in order.
fn bind_fields(fields: &Fields) -> (TokenStream2, TokenStream2, TokenStream2) {
    let decode = quote! { crate::types::encoding::Decode::decode(input)? };
    match fields {
        Fields::Unit => (quote! {}, quote! {}, quote! {}),
        Fields::Unnamed(fields) => {
            let idents: Vec<_> = (0..fields.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let decodes = idents.iter().map(|_| &decode);
            (
                quote! { ( #(#idents),* ) },
                quote! { #( crate::types::encoding::Encode::encode(#idents, out); )* },
                quote! { ( #(#decodes),* ) },
            )
        }
        Fields::Named(fields) => {
            let idents: Vec<_> = fields.named.iter().filter_map(|f| f.ident.as_ref()).collect();
            (
                quote! { { #(#idents),* } },
                quote! { #( crate::types::encoding::Encode::encode(#idents, out); )* },
                quote! { { #( #idents: #decode ),* } },
            )
        }
    }
}
