use quote::ToTokens;
use syn::{Attribute, Field, FieldsNamed, Token, Type, punctuated::Punctuated};

// 提取非 derive 属性与已有 derive 列表
pub(crate) fn split_derives(attrs: &[Attribute]) -> (Vec<Attribute>, Vec<syn::Path>) {
    let mut retained = Vec::new();
    let mut existing = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("derive") {
            retained.push(attr.clone());
            continue;
        }
        if let Ok(list) = attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
        {
            existing.extend(list);
        }
    }
    (retained, existing)
}

// 合并必需与已有 derive，按归一化 key 去重，必需项在前
pub(crate) fn merge_derives(existing: Vec<syn::Path>, required: Vec<syn::Path>) -> Attribute {
    let mut seen = std::collections::HashSet::<String>::new();
    let merged: Vec<syn::Path> = required
        .into_iter()
        .chain(existing)
        .filter(|p| seen.insert(derive_key(p)))
        .collect();
    syn::parse_quote!(#[derive(#(#merged),*)])
}

// Serialize 与 serde::Serialize 视为同一项
pub(crate) fn derive_key(p: &syn::Path) -> String {
    match p.segments.last() {
        Some(last) => {
            let ident = last.ident.to_string();
            match ident.as_str() {
                "Serialize" | "Deserialize" => format!("serde::{ident}"),
                _ => ident,
            }
        }
        None => p.to_token_stream().to_string(),
    }
}

pub(crate) fn apply_derives(attrs: &mut Vec<Attribute>, required: Vec<syn::Path>) {
    let (retained, existing) = split_derives(attrs);
    let merged = merge_derives(existing, required);
    *attrs = std::iter::once(merged).chain(retained).collect();
}

/// 缺失的必需字段按给定顺序补在最前，已有字段保持原顺序与原定义
pub(crate) fn ensure_required_fields(fields_named: &mut FieldsNamed, required: &[(&str, &Type)]) {
    let old_named = fields_named.named.clone();
    let mut new_named: Punctuated<Field, Token![,]> = Punctuated::new();

    for (name, ty) in required {
        if !has_field(&old_named, name) {
            let ident = syn::Ident::new(name, proc_macro2::Span::call_site());
            new_named.push(syn::parse_quote! { #ident: #ty });
        }
    }
    new_named.extend(old_named);

    fields_named.named = new_named;
}

pub(crate) fn has_field(named: &Punctuated<Field, Token![,]>, name: &str) -> bool {
    named
        .iter()
        .any(|f| f.ident.as_ref().is_some_and(|i| i == name))
}

/// 解析 `#[name(flag)]` / `#[name(key = "lit")]` 形式的属性参数
pub(crate) fn parse_str_arg(attr: &Attribute, key: &str) -> syn::Result<Option<syn::LitStr>> {
    let mut value = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident(key) {
            if value.is_some() {
                return Err(meta.error(format!("duplicate key '{key}' in attribute")));
            }
            value = Some(meta.value()?.parse::<syn::LitStr>()?);
            Ok(())
        } else {
            Err(meta.error(format!("unknown key; expected '{key}'")))
        }
    })?;
    Ok(value)
}
