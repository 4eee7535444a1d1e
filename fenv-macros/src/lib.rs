//! Procedural macros for fenv user artifacts.
//!
//! # Example
//!
//! ```ignore
//! use fenv_sdk::{BoxError, FenvWireRequest, FenvWireResponse, Function};
//!
//! #[derive(Default)]
//! pub struct HelloWorld;
//!
//! impl Function for HelloWorld {
//!     fn handle(&self, _req: FenvWireRequest) -> Result<FenvWireResponse, BoxError> {
//!         Ok("Hello World!".into())
//!     }
//! }
//!
//! fenv_macros::export_functions!(HelloWorld);
//! ```

use proc_macro::TokenStream;
use quote::{quote, ToTokens};
use syn::{parse::Parser, punctuated::Punctuated, Path, Token};

/// Export the listed `Function + Default` types as the artifact's type table.
///
/// Generates the `fenv_types_v1` symbol the container looks up when it
/// specializes. Invoke it once per library.
#[proc_macro]
pub fn export_functions(input: TokenStream) -> TokenStream {
    match generate_type_table(input.into()) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_type_table(input: proc_macro2::TokenStream) -> syn::Result<proc_macro2::TokenStream> {
    let types = Punctuated::<Path, Token![,]>::parse_terminated.parse2(input)?;

    if types.is_empty() {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "export_functions! expects at least one type",
        ));
    }

    let count = types.len();
    let entries = types.iter().map(|ty| {
        let name = type_name(ty);
        quote! {
            ::fenv_sdk::FenvTypeDescriptor::function::<#ty>(
                concat!(module_path!(), "::", #name)
            )
        }
    });

    Ok(quote! {
        /// Type table read by the fenv container on specialization.
        #[unsafe(no_mangle)]
        pub extern "C" fn fenv_types_v1() -> ::fenv_sdk::FenvTypeTable {
            static TYPES: [::fenv_sdk::FenvTypeDescriptor; #count] = [#(#entries),*];
            ::fenv_sdk::FenvTypeTable::from_static(&TYPES)
        }
    })
}

/// Path as written, without the spaces `to_token_stream` inserts.
fn type_name(ty: &Path) -> String {
    ty.to_token_stream()
        .to_string()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}
