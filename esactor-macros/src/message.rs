use crate::utils::parse_str_arg;
use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

/// `#[derive(Message)]`
/// - 默认地址：`module_path!()::TypeName`（完全限定类型名）
/// - 覆写：`#[message(address = "...")]`
pub(crate) fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let mut address: Option<syn::LitStr> = None;
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("message")) {
        match parse_str_arg(attr, "address") {
            Ok(Some(lit)) if address.is_none() => address = Some(lit),
            Ok(Some(lit)) => {
                return syn::Error::new(lit.span(), "duplicate 'address' for this message")
                    .to_compile_error()
                    .into();
            }
            Ok(None) => {}
            Err(err) => return err.to_compile_error().into(),
        }
    }

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let address = match address {
        Some(lit) => quote! { #lit },
        None => quote! { concat!(module_path!(), "::", stringify!(#ident)) },
    };

    let out = quote! {
        impl #impl_generics ::esactor_domain::message::Message for #ident #ty_generics #where_clause {
            const ADDRESS: &'static str = #address;
        }
    };
    TokenStream::from(out)
}
