//! host_code.rs
//!
//! Expansion for `#[derive(HostErrorCode)]`. Every variant of the derived
//! enum must carry exactly one `#[host_code(Variant)]` attribute, where
//! `Variant` names a variant of `crate::error::HostCode` in the crate that
//! derives it. The generated `to_host_code` method is a straight match,
//! identical in shape to one a human would hand-write — the derive exists
//! only to keep the mapping co-located with the taxonomy it describes
//! instead of in a separate table that can drift out of sync.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{parse2, Data, DeriveInput, Error, Fields, Ident, Result};

pub fn expand(input: TokenStream) -> Result<TokenStream> {
    let input: DeriveInput = parse2(input)?;
    let name = &input.ident;

    let data = match &input.data {
        Data::Enum(data) => data,
        _ => {
            return Err(Error::new_spanned(
                &input,
                "HostErrorCode can only be derived for an enum",
            ))
        }
    };

    let mut arms = Vec::new();
    for variant in &data.variants {
        let attr = variant
            .attrs
            .iter()
            .find(|a| a.path().is_ident("host_code"))
            .ok_or_else(|| {
                Error::new_spanned(
                    variant,
                    "each variant must carry #[host_code(SomeHostCode)]",
                )
            })?;
        let mapped: Ident = attr.parse_args()?;

        let variant_ident = &variant.ident;
        let pattern = match &variant.fields {
            Fields::Unit => quote! { Self::#variant_ident },
            Fields::Unnamed(_) => quote! { Self::#variant_ident(..) },
            Fields::Named(_) => quote! { Self::#variant_ident { .. } },
        };
        arms.push(quote! { #pattern => crate::error::HostCode::#mapped, });
    }

    Ok(quote! {
        impl #name {
            /// Map this error to the code taxonomy surfaced to the host
            /// block layer.
            pub fn to_host_code(&self) -> crate::error::HostCode {
                match self {
                    #(#arms)*
                }
            }
        }
    })
}
