use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, parse_macro_input, spanned::Spanned};

/// `#[derive(AggregateCommand)]`
/// - 结构体或具名字段枚举；每个结构体/变体须含 `aggregate_id` 与 `correlation_id` 字段
/// - 生成 `DomainCommand` 与 `AggregateCommand` 实现
/// - `#[command(creation)]` 标记创建命令（结构体或变体级）
pub(crate) fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_inner(&input) {
        Ok(ts) => ts.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_inner(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    let name = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (aggregate_id, correlation_id, is_creation, command_name) = match &input.data {
        Data::Struct(data) => {
            require_fields(&data.fields, data.fields.span())?;
            let creation = is_creation(&input.attrs)?;
            (
                quote! { self.aggregate_id },
                quote! { self.correlation_id },
                quote! { #creation },
                quote! { #name },
            )
        }
        Data::Enum(data) => {
            let mut id_arms = Vec::new();
            let mut corr_arms = Vec::new();
            let mut creation_arms = Vec::new();
            let mut name_arms = Vec::new();
            for v in &data.variants {
                require_fields(&v.fields, v.span())?;
                let v_ident = &v.ident;
                let creation = is_creation(&v.attrs)?;
                let full = format!("{name}.{v_ident}");
                id_arms.push(quote! { Self::#v_ident { aggregate_id, .. } => *aggregate_id });
                corr_arms.push(quote! { Self::#v_ident { correlation_id, .. } => *correlation_id });
                creation_arms.push(quote! { Self::#v_ident { .. } => #creation });
                name_arms.push(quote! { Self::#v_ident { .. } => #full });
            }
            (
                quote! { match self { #( #id_arms, )* } },
                quote! { match self { #( #corr_arms, )* } },
                quote! { match self { #( #creation_arms, )* } },
                quote! { match self { #( #name_arms, )* } },
            )
        }
        Data::Union(u) => {
            return Err(syn::Error::new(
                u.union_token.span(),
                "#[derive(AggregateCommand)] does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::esactor_domain::message::DomainCommand for #ident #ty_generics #where_clause {
            fn correlation_id(&self) -> ::esactor_domain::value_object::CorrelationId {
                #correlation_id
            }
        }

        impl #impl_generics ::esactor_domain::message::AggregateCommand for #ident #ty_generics #where_clause {
            fn aggregate_id(&self) -> ::esactor_domain::value_object::AggregateId {
                #aggregate_id
            }

            fn is_creation(&self) -> bool {
                #is_creation
            }

            fn command_name(&self) -> &'static str {
                #command_name
            }
        }
    })
}

fn require_fields(fields: &Fields, span: proc_macro2::Span) -> syn::Result<()> {
    let Fields::Named(named) = fields else {
        return Err(syn::Error::new(
            span,
            "#[derive(AggregateCommand)] supports only named fields, e.g., Variant { x: T }",
        ));
    };
    for required in ["aggregate_id", "correlation_id"] {
        if !crate::utils::has_field(&named.named, required) {
            return Err(syn::Error::new(
                span,
                format!("missing required field `{required}`"),
            ));
        }
    }
    Ok(())
}

fn is_creation(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut creation = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("command")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("creation") {
                creation = true;
                Ok(())
            } else {
                Err(meta.error("unknown key; expected 'creation'"))
            }
        })?;
    }
    Ok(creation)
}
