use crate::utils::{apply_derives, ensure_required_fields, parse_str_arg};
use proc_macro::TokenStream;
use quote::quote;
use syn::{Item, Type, parse_macro_input, spanned::Spanned};

/// #[aggregate_event] 宏实现
/// - 仅支持具名字段变体：`Variant { .. }`
/// - 确保每个变体具备字段：`aggregate_id`、`aggregate_version`、`correlation_id`
/// - 追加派生：Debug, Clone, PartialEq, Serialize, Deserialize
/// - 生成 `::esactor_domain::message::AggregateEvent` 实现，持久化类型默认为 `Enum.Variant`
/// - 变体可覆写：`#[event(event_type = "...")]`
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::TokenStream::from(attr).span(),
            "#[aggregate_event] takes no arguments",
        )
        .to_compile_error()
        .into();
    }

    let mut input = parse_macro_input!(item as Item);
    let enum_item = match &mut input {
        Item::Enum(e) => e,
        other => {
            return syn::Error::new(
                other.span(),
                "#[aggregate_event] can only be used on enum types",
            )
            .to_compile_error()
            .into();
        }
    };

    let required: Vec<syn::Path> = vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    apply_derives(&mut enum_item.attrs, required);

    let id_ty: Type = syn::parse_quote! { ::esactor_domain::value_object::AggregateId };
    let version_ty: Type = syn::parse_quote! { ::esactor_domain::value_object::AggregateVersion };
    let corr_ty: Type = syn::parse_quote! { ::esactor_domain::value_object::CorrelationId };

    let enum_name = enum_item.ident.to_string();
    let mut event_types: Vec<syn::LitStr> = Vec::new();

    for v in &mut enum_item.variants {
        let syn::Fields::Named(fields_named) = &mut v.fields else {
            return syn::Error::new(
                v.span(),
                "#[aggregate_event] supports only named-field enum variants, e.g., Variant { x: T }",
            )
            .to_compile_error()
            .into();
        };
        ensure_required_fields(
            fields_named,
            &[
                ("aggregate_id", &id_ty),
                ("aggregate_version", &version_ty),
                ("correlation_id", &corr_ty),
            ],
        );

        let mut retained = Vec::new();
        let mut event_type: Option<syn::LitStr> = None;
        for attr in &v.attrs {
            if !attr.path().is_ident("event") {
                retained.push(attr.clone());
                continue;
            }
            match parse_str_arg(attr, "event_type") {
                Ok(Some(lit)) if event_type.is_none() => event_type = Some(lit),
                Ok(Some(lit)) => {
                    return syn::Error::new(
                        lit.span(),
                        "duplicate 'event_type' specified for this variant",
                    )
                    .to_compile_error()
                    .into();
                }
                Ok(None) => {}
                Err(err) => return err.to_compile_error().into(),
            }
        }
        v.attrs = retained;

        event_types.push(event_type.unwrap_or_else(|| {
            syn::LitStr::new(&format!("{enum_name}.{}", v.ident), v.ident.span())
        }));
    }

    let enum_ident = &enum_item.ident;
    let (impl_generics, ty_generics, where_clause) = enum_item.generics.split_for_impl();
    let variants: Vec<&syn::Ident> = enum_item.variants.iter().map(|v| &v.ident).collect();

    let out = quote! {
        #enum_item

        impl #impl_generics ::esactor_domain::message::AggregateEvent for #enum_ident #ty_generics #where_clause {
            const EVENT_TYPES: &'static [&'static str] = &[ #( #event_types ),* ];

            fn event_type(&self) -> &'static str {
                match self { #( Self::#variants { .. } => #event_types, )* }
            }

            fn aggregate_id(&self) -> ::esactor_domain::value_object::AggregateId {
                match self { #( Self::#variants { aggregate_id, .. } => *aggregate_id, )* }
            }

            fn aggregate_version(&self) -> ::esactor_domain::value_object::AggregateVersion {
                match self { #( Self::#variants { aggregate_version, .. } => *aggregate_version, )* }
            }

            fn correlation_id(&self) -> ::esactor_domain::value_object::CorrelationId {
                match self { #( Self::#variants { correlation_id, .. } => *correlation_id, )* }
            }
        }
    };

    TokenStream::from(out)
}
