use heck::ToLowerCamelCase;
use proc_macro::TokenStream;
use quote::{quote, ToTokens};
use syn::{
    bracketed, parse::Parse, parse_macro_input, punctuated::Punctuated, spanned::Spanned, Attribute, Data,
    DeriveInput, Field, Fields, LitStr, Path, Token, Type,
};

/// Capabilities the framework itself defines; a bare ident matching one of
/// these resolves to the `::wirekit` item. Any other ident is a user trait,
/// even one spelled close to these.
const FRAMEWORK_CAPABILITIES: &[&str] = &[
    "Startable",
    "Stoppable",
    "Decorator",
    "IndexAware",
    "LoggerAware",
];

const COMPONENT_ARGS: &[&str] = &["capabilities"];

fn suggest_similar(input: &str, candidates: &[&'static str], threshold: f64) -> Vec<&'static str> {
    let mut suggestions: Vec<(&str, f64)> = candidates
        .iter()
        .map(|&c| (c, strsim::jaro_winkler(input, c)))
        .filter(|(_, score)| *score > threshold)
        .collect();

    suggestions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    suggestions.into_iter().take(2).map(|(c, _)| c).collect()
}

/// Resolve one entry of `capabilities = [...]` to a trait path. Framework
/// names map to `::wirekit`; anything else is taken as written and left for
/// name resolution.
fn capability_path(path: Path) -> proc_macro2::TokenStream {
    match path.get_ident() {
        Some(ident) if FRAMEWORK_CAPABILITIES.contains(&ident.to_string().as_str()) => {
            quote! { ::wirekit::#ident }
        }
        _ => path.into_token_stream(),
    }
}

/// Parsed `#[component(...)]` on the struct.
#[derive(Default)]
struct ComponentConfig {
    capabilities: Vec<proc_macro2::TokenStream>,
}

impl ComponentConfig {
    fn from_attrs(attrs: &[Attribute]) -> syn::Result<Self> {
        let mut config = ComponentConfig::default();
        let mut seen_caps = false;

        for attr in attrs.iter().filter(|a| a.path().is_ident("component")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("capabilities") {
                    if seen_caps {
                        return Err(meta.error("duplicate `capabilities` parameter"));
                    }
                    seen_caps = true;

                    let value = meta.value()?;
                    let content;
                    bracketed!(content in value);
                    let paths: Punctuated<Path, Token![,]> =
                        content.parse_terminated(Path::parse, Token![,])?;
                    for path in paths {
                        config.capabilities.push(capability_path(path));
                    }
                    return Ok(());
                }

                let unknown = meta
                    .path
                    .get_ident()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| meta.path.to_token_stream().to_string());
                let suggestions = suggest_similar(&unknown, COMPONENT_ARGS, 0.6);
                let msg = if suggestions.is_empty() {
                    format!("unknown component parameter '{unknown}', expected: capabilities = [...]")
                } else {
                    format!(
                        "unknown component parameter '{unknown}'\n       = help: did you mean: {}?",
                        suggestions.join(", ")
                    )
                };
                Err(meta.error(msg))
            })?;
        }

        Ok(config)
    }
}

#[derive(Clone, Copy, PartialEq)]
enum FieldRole {
    Inject,
    Config,
    Plain,
}

/// One named field and the logical names it answers to.
struct FieldSpec {
    member: syn::Ident,
    ty: Type,
    names: Vec<LitStr>,
    role: FieldRole,
}

impl FieldSpec {
    fn from_field(field: &Field) -> syn::Result<Self> {
        let Some(member) = field.ident.clone() else {
            return Err(syn::Error::new(field.span(), "expected a named field"));
        };

        let mut role = FieldRole::Plain;
        let mut rename: Option<LitStr> = None;

        for attr in &field.attrs {
            let this_role = if attr.path().is_ident("inject") {
                FieldRole::Inject
            } else if attr.path().is_ident("config") {
                FieldRole::Config
            } else {
                continue;
            };
            if role != FieldRole::Plain {
                return Err(syn::Error::new_spanned(
                    attr,
                    "a field can be either #[inject] or #[config], once",
                ));
            }
            role = this_role;

            if let syn::Meta::List(_) = attr.meta {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("rename") {
                        rename = Some(meta.value()?.parse()?);
                        Ok(())
                    } else {
                        Err(meta.error("expected `rename = \"...\"`"))
                    }
                })?;
            }
        }

        let span = member.span();
        let names = match rename {
            Some(lit) => vec![lit],
            None => {
                let raw = member.to_string();
                let base = raw.strip_prefix("r#").unwrap_or(&raw).to_owned();
                let camel = base.to_lower_camel_case();
                let mut names = vec![LitStr::new(&base, span)];
                if camel != base {
                    names.push(LitStr::new(&camel, span));
                }
                names
            }
        };

        Ok(FieldSpec {
            member,
            ty: field.ty.clone(),
            names,
            role,
        })
    }
}

/// Derive `wirekit::Component`.
///
/// - `#[component(capabilities = [Startable, Stoppable, MyTrait])]` declares the
///   capabilities offered besides the concrete type. Framework names resolve to
///   `::wirekit`; anything else must be a trait in scope.
/// - `#[inject]` marks a `Dep<T>` field the container wires by name.
/// - `#[config]` marks a `Setting<T>` field filled from a config promise.
///
/// Each field answers to its Rust name and its lowerCamelCase form
/// (`user_store` / `userStore`), or only to `rename = "..."` when given.
#[proc_macro_derive(Component, attributes(component, inject, config))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new_spanned(
                    struct_ident,
                    "#[derive(Component)] needs named fields so they can be wired by name",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                struct_ident,
                "#[derive(Component)] can only be used on structs",
            ))
        }
    };

    let config = ComponentConfig::from_attrs(&input.attrs)?;
    let specs = fields
        .into_iter()
        .map(FieldSpec::from_field)
        .collect::<syn::Result<Vec<_>>>()?;

    let capabilities = &config.capabilities;

    let mut dependency_arms = Vec::new();
    let mut config_arms = Vec::new();
    for spec in &specs {
        let member = &spec.member;
        let names = &spec.names;
        let ty = &spec.ty;
        let kind = ty.to_token_stream().to_string();

        let (dep_arm, cfg_arm) = match spec.role {
            FieldRole::Inject => (
                quote! { #(#names)|* => ::wirekit::Dep::wire(&self.#member, target), },
                quote! {
                    #(#names)|* => ::core::result::Result::Err(::wirekit::InjectError::UnsupportedKind {
                        field: field.to_owned(),
                        kind: #kind,
                    }),
                },
            ),
            FieldRole::Config => (
                quote! {
                    #(#names)|* => ::core::result::Result::Err(::wirekit::InjectError::NotInjectable {
                        field: field.to_owned(),
                        kind: #kind,
                    }),
                },
                quote! { #(#names)|* => ::wirekit::Setting::coerce_from(&self.#member, value), },
            ),
            FieldRole::Plain => (
                quote! {
                    #(#names)|* => ::core::result::Result::Err(::wirekit::InjectError::NotInjectable {
                        field: field.to_owned(),
                        kind: #kind,
                    }),
                },
                quote! {
                    #(#names)|* => ::core::result::Result::Err(::wirekit::InjectError::UnsupportedKind {
                        field: field.to_owned(),
                        kind: #kind,
                    }),
                },
            ),
        };
        dependency_arms.push(dep_arm);
        config_arms.push(cfg_arm);
    }

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::wirekit::Component for #struct_ident #ty_generics #where_clause {
            fn declare_capabilities(
                self: ::std::sync::Arc<Self>,
                caps: &mut ::wirekit::Capabilities,
            ) {
                #( caps.provide::<dyn #capabilities>(::std::sync::Arc::<Self>::clone(&self)); )*
                caps.provide::<Self>(self);
            }

            #[allow(unused_variables)]
            fn inject_dependency(
                &self,
                field: &str,
                target: &::wirekit::ComponentRecord,
            ) -> ::core::result::Result<(), ::wirekit::InjectError> {
                match field {
                    #(#dependency_arms)*
                    _ => ::core::result::Result::Err(::wirekit::InjectError::UnknownField {
                        field: field.to_owned(),
                    }),
                }
            }

            #[allow(unused_variables)]
            fn inject_config(
                &self,
                field: &str,
                value: &::wirekit::serde_json::Value,
            ) -> ::core::result::Result<(), ::wirekit::InjectError> {
                match field {
                    #(#config_arms)*
                    _ => ::core::result::Result::Err(::wirekit::InjectError::UnknownField {
                        field: field.to_owned(),
                    }),
                }
            }
        }
    })
}
