//! Derive macro for error types.
//!
//! ```ignore
//! use simnet_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum CallError {
//!     #[error("unknown account: {0}")]
//!     UnknownAccount(String),
//!
//!     #[error("expected {expected} arguments, got {actual}")]
//!     Arity { expected: usize, actual: usize },
//!
//!     #[error("execution trapped: {0}")]
//!     Trap(#[from] VMError),
//! }
//! ```
//!
//! Tuple fields are interpolated positionally (`{0}`), named fields by name.
//! A single-field tuple variant whose field carries `#[from]` also gets a
//! `From` impl and reports that field as its `source()`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Lit, Meta, Variant, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    match &input.data {
        Data::Enum(data) => {
            let mut display_arms = Vec::with_capacity(data.variants.len());
            let mut source_arms = Vec::new();
            let mut from_impls = Vec::new();

            for variant in &data.variants {
                display_arms.push(display_arm(variant)?);

                if let Some(from_ty) = from_field(variant)? {
                    let ident = &variant.ident;
                    source_arms.push(quote! {
                        Self::#ident(inner) => Some(inner),
                    });
                    from_impls.push(quote! {
                        impl #impl_generics ::std::convert::From<#from_ty> for #name #ty_generics #where_clause {
                            fn from(value: #from_ty) -> Self {
                                Self::#ident(value)
                            }
                        }
                    });
                }
            }

            let source_fn = if source_arms.is_empty() {
                quote! {}
            } else {
                quote! {
                    fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
                        match self {
                            #(#source_arms)*
                            _ => None,
                        }
                    }
                }
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    #[allow(unused_variables)]
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        match self {
                            #(#display_arms)*
                        }
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
                    #source_fn
                }

                #(#from_impls)*
            })
        }
        Data::Struct(data) => {
            let message = message_from_attrs(&input.attrs, &input.ident, "type")?;
            let body = match &data.fields {
                Fields::Unit => quote! { write!(f, #message) },
                Fields::Named(fields) => {
                    let idents: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                    quote! { write!(f, #message, #(#idents = self.#idents),*) }
                }
                Fields::Unnamed(fields) => {
                    let count = fields.unnamed.len();
                    let idents: Vec<_> = (0..count).map(|i| format_ident!("f{}", i)).collect();
                    let indices: Vec<_> = (0..count).map(syn::Index::from).collect();
                    let message = positional_to_named(&message, count);
                    quote! { write!(f, #message, #(#idents = self.#indices),*) }
                }
            };

            Ok(quote! {
                impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
                    fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        #body
                    }
                }

                impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
            })
        }
        Data::Union(_) => Err(syn::Error::new_spanned(
            input,
            "Error derive does not support unions",
        )),
    }
}

fn display_arm(variant: &Variant) -> syn::Result<TokenStream2> {
    let ident = &variant.ident;
    let message = message_from_attrs(&variant.attrs, ident, "variant")?;

    Ok(match &variant.fields {
        Fields::Unit => quote! {
            Self::#ident => write!(f, #message),
        },
        Fields::Unnamed(fields) => {
            let count = fields.unnamed.len();
            let idents: Vec<_> = (0..count).map(|i| format_ident!("f{}", i)).collect();
            let message = positional_to_named(&message, count);
            let used: Vec<_> = idents
                .iter()
                .filter(|i| references(&message, &i.to_string()))
                .collect();
            quote! {
                Self::#ident(#(#idents),*) => write!(f, #message, #(#used = #used),*),
            }
        }
        Fields::Named(fields) => {
            let idents: Vec<_> = fields.named.iter().filter_map(|f| f.ident.as_ref()).collect();
            let used: Vec<_> = idents
                .iter()
                .filter(|i| references(&message, &i.to_string()))
                .collect();
            quote! {
                Self::#ident { #(#idents),* } => write!(f, #message, #(#used = #used),*),
            }
        }
    })
}

/// Returns the field type of a `Variant(#[from] T)` variant.
fn from_field(variant: &Variant) -> syn::Result<Option<syn::Type>> {
    let fields = match &variant.fields {
        Fields::Unnamed(fields) => &fields.unnamed,
        Fields::Named(fields) => &fields.named,
        Fields::Unit => return Ok(None),
    };

    let marked: Vec<_> = fields
        .iter()
        .filter(|field| field.attrs.iter().any(|a| a.path().is_ident("from")))
        .collect();

    match (marked.as_slice(), &variant.fields) {
        ([], _) => Ok(None),
        ([field], Fields::Unnamed(_)) if fields.len() == 1 => Ok(Some(field.ty.clone())),
        _ => Err(syn::Error::new_spanned(
            variant,
            "#[from] is only supported on the single field of a tuple variant",
        )),
    }
}

fn message_from_attrs<T: ToTokens>(
    attrs: &[Attribute],
    target: &T,
    kind: &str,
) -> syn::Result<String> {
    let Some(attr) = attrs.iter().find(|a| a.path().is_ident("error")) else {
        return Err(syn::Error::new_spanned(
            target,
            format!("missing #[error(\"...\")] attribute on {kind}"),
        ));
    };

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] message must be a string literal",
        )),
    }
}

/// Returns true if `message` interpolates the argument `name`.
fn references(message: &str, name: &str) -> bool {
    message.contains(&format!("{{{name}}}")) || message.contains(&format!("{{{name}:"))
}

/// Rewrites `{0}`, `{1}` into `{f0}`, `{f1}` so tuple fields bind by name.
fn positional_to_named(message: &str, count: usize) -> String {
    (0..count).rev().fold(message.to_string(), |acc, i| {
        acc.replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"))
    })
}
