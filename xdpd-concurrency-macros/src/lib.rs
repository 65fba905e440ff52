// SPDX-License-Identifier: Apache-2.0

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Ident, Item,
    parse::{Parse, ParseStream},
    parse_macro_input,
};

struct ConcurrencyModeArgs {
    mode: Ident,
}

impl Parse for ConcurrencyModeArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        Ok(ConcurrencyModeArgs {
            mode: input.parse()?,
        })
    }
}

/// Gate an item to only compile under a given concurrency backend.
///
/// `#[concurrency_mode(std)]`, `#[concurrency_mode(loom)]`, or
/// `#[concurrency_mode(shuttle)]`.
#[proc_macro_attribute]
pub fn concurrency_mode(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as ConcurrencyModeArgs);
    let item = parse_macro_input!(item as Item);
    let mode = args.mode.to_string();

    let output = match mode.as_str() {
        "shuttle" => quote! { ::xdpd_concurrency::with_shuttle! { #item } },
        "loom" => quote! { ::xdpd_concurrency::with_loom! { #item } },
        "std" => quote! { ::xdpd_concurrency::with_std! { #item } },
        _ => {
            return syn::Error::new_spanned(
                args.mode,
                "expected `std`, `loom`, or `shuttle` as the argument to #[concurrency_mode]",
            )
            .to_compile_error()
            .into();
        }
    };

    output.into()
}
