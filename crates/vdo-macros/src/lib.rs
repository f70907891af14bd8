//! vdo-macros
//!
//! A single derive macro, `HostErrorCode`, that generates the
//! error-code-to-host mapping table from `#[host_code(...)]` attributes on
//! the error taxonomy's variants, in place of a hand-written match.
use proc_macro::TokenStream;
mod host_code;

#[proc_macro_derive(HostErrorCode, attributes(host_code))]
pub fn derive_host_error_code(item: TokenStream) -> TokenStream {
    host_code::expand(item.into()).map_or_else(
        |e| TokenStream::from(e.to_compile_error()),
        TokenStream::from,
    )
}
