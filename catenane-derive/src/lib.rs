use std::collections::HashSet;

use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, DeriveInput};

/// Derive macro for the `Persist` trait.
///
/// Only fields marked `#[persist]` take part in the graph walk; the rest are
/// left at their `Default` value when a document is read back. The type must
/// implement `Default` to be registered for deserialization.
///
/// # Example
///
/// ```ignore
/// use catenane_core::{Persist, Shared};
///
/// #[derive(Debug, Default, Persist)]
/// #[persist(type_name = "demo::Employee")]
/// struct Employee {
///     #[persist]
///     name: String,
///     #[persist(rename = "reports_to")]
///     manager: Option<Shared<Employee>>,
///     cache: Vec<u8>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[persist]` - Mark a field as a member
/// - `#[persist(rename = "name")]` - Mark a field and use a custom member name
/// - `#[persist(type_name = "path::Name")]` - On the struct: stable name for type tags,
///   instead of `module_path!()::Ident`
#[proc_macro_derive(Persist, attributes(persist))]
pub fn derive_persist(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_persist_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_persist_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Persist cannot be derived for generic types; type tags need one name per type",
        ));
    }

    let fields = match &input.data {
        syn::Data::Struct(syn::DataStruct {
            fields: syn::Fields::Named(named),
            ..
        }) => &named.named,
        syn::Data::Struct(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Persist can only be derived for structs with named fields",
            ));
        }
        syn::Data::Enum(_) | syn::Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Persist can only be derived for structs",
            ));
        }
    };

    let container = parse_container_attrs(&input.attrs)?;
    let qualified_name = match container.type_name {
        Some(type_name) => quote! { #type_name },
        None => quote! { ::std::concat!(::std::module_path!(), "::", ::std::stringify!(#name)) },
    };

    let mut writes = Vec::new();
    let mut reads = Vec::new();
    let mut members = HashSet::new();
    for field in fields {
        let attrs = parse_field_attrs(&field.attrs)?;
        if !attrs.marked {
            continue;
        }
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let member = attrs.rename.unwrap_or_else(|| ident.unraw().to_string());
        if !members.insert(member.clone()) {
            return Err(syn::Error::new_spanned(
                field,
                format!("duplicate persist member name `{member}`"),
            ));
        }
        writes.push(quote! { out.write(#member, &self.#ident)?; });
        reads.push(quote! { input.read(#member, &mut self.#ident)?; });
    }

    Ok(quote! {
        impl ::catenane_core::Persist for #name {
            fn qualified_name() -> &'static str {
                #qualified_name
            }

            fn type_name(&self) -> &'static str {
                <Self as ::catenane_core::Persist>::qualified_name()
            }

            #[allow(unused_variables)]
            fn write_members(
                &self,
                out: &mut ::catenane_core::Emitter<'_>,
            ) -> ::std::result::Result<(), ::catenane_core::GraphError> {
                #(#writes)*
                ::std::result::Result::Ok(())
            }

            #[allow(unused_variables)]
            fn read_members(
                &mut self,
                input: &mut ::catenane_core::Loader<'_, '_>,
            ) -> ::std::result::Result<(), ::catenane_core::GraphError> {
                #(#reads)*
                ::std::result::Result::Ok(())
            }
        }
    })
}

#[derive(Default)]
struct ContainerAttrs {
    type_name: Option<String>,
}

fn parse_container_attrs(attrs: &[syn::Attribute]) -> syn::Result<ContainerAttrs> {
    let mut result = ContainerAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("persist") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("type_name") {
                let value: syn::LitStr = meta.value()?.parse()?;
                result.type_name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported persist container attribute"))
            }
        })?;
    }

    Ok(result)
}

#[derive(Default)]
struct FieldAttrs {
    marked: bool,
    rename: Option<String>,
}

fn parse_field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("persist") {
            continue;
        }
        result.marked = true;

        // Bare `#[persist]` just marks the field.
        if matches!(attr.meta, syn::Meta::Path(_)) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: syn::LitStr = meta.value()?.parse()?;
                let name = value.value();
                if name.is_empty() || name.contains('/') {
                    return Err(syn::Error::new_spanned(
                        &value,
                        "member names must be non-empty and must not contain '/'",
                    ));
                }
                result.rename = Some(name);
                Ok(())
            } else {
                Err(meta.error("unsupported persist field attribute"))
            }
        })?;
    }

    Ok(result)
}
