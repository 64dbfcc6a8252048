use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, DataEnum, DeriveInput, Fields, LitStr, Variant};

/// Turns `SomeVariantName` into `some variant name`
fn humanize(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, c) in ident.char_indices() {
        if c.is_uppercase() && i > 0 {
            out.push(' ');
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

fn find_attr<'a>(v: &'a Variant, name: &str) -> Option<&'a Attribute> {
    v.attrs.iter().find(|a| a.path().is_ident(name))
}

fn lit_arg(attr: &Attribute) -> String {
    attr.parse_args::<LitStr>()
        .expect("attribute expects a string literal")
        .value()
}

fn enum_data(input: DeriveInput) -> (syn::Ident, DataEnum) {
    match input.data {
        syn::Data::Enum(e) => (input.ident, e),
        _ => panic!("derive only supports enums"),
    }
}

/// Derives const `name()` and `description()` on an error enum usable
/// from no_std code.
///
/// * `#[error("msg")]` sets the description of a variant
/// * `#[wrap]` forwards the description to the single unnamed field
/// * without attribute the description is derived from the variant name
#[proc_macro_derive(BpfError, attributes(error, wrap))]
pub fn bpf_error_derive(item: TokenStream) -> TokenStream {
    let (enum_name, data) = enum_data(parse_macro_input!(item as DeriveInput));

    let mut name_arms: Vec<TokenStream2> = vec![];
    let mut desc_arms: Vec<TokenStream2> = vec![];

    for v in data.variants.iter() {
        let ident = &v.ident;
        let ident_str = ident.to_string();

        name_arms.push(quote!(Self::#ident { .. } => #ident_str,));

        if find_attr(v, "wrap").is_some() {
            match &v.fields {
                Fields::Unnamed(f) if f.unnamed.len() == 1 => {
                    desc_arms.push(quote!(Self::#ident(inner) => inner.description(),))
                }
                _ => panic!("#[wrap] variant must hold exactly one unnamed field"),
            }
            continue;
        }

        let desc = match find_attr(v, "error") {
            Some(attr) => lit_arg(attr),
            None => humanize(&ident_str),
        };
        desc_arms.push(quote!(Self::#ident { .. } => #desc,));
    }

    quote!(
        impl #enum_name {
            #[inline(always)]
            pub const fn name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }

            #[inline(always)]
            pub const fn description(&self) -> &'static str {
                match self {
                    #(#desc_arms)*
                }
            }
        }
    )
    .into()
}

/// Derives string conversions for a field-less enum.
///
/// `#[str("name")]` overrides the string of a variant, the variant
/// identifier is used otherwise.
#[proc_macro_derive(StrEnum, attributes(str))]
pub fn str_enum_derive(item: TokenStream) -> TokenStream {
    let (enum_name, data) = enum_data(parse_macro_input!(item as DeriveInput));

    let mut as_str_arms = vec![];
    let mut from_str_arms = vec![];
    let mut variants = vec![];

    for v in data.variants.iter() {
        if !v.fields.is_empty() {
            panic!("StrEnum variants cannot hold values");
        }

        let ident = &v.ident;
        let s = find_attr(v, "str")
            .map(lit_arg)
            .unwrap_or_else(|| ident.to_string());

        as_str_arms.push(quote!(Self::#ident => #s,));
        from_str_arms.push(quote!(#s => Ok(Self::#ident),));
        variants.push(quote!(Self::#ident,));
    }

    let count = variants.len();

    quote!(
        impl core::str::FromStr for #enum_name {
            type Err = &'static str;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    #(#from_str_arms)*
                    _ => Err("unknown variant string"),
                }
            }
        }

        impl #enum_name {
            pub const fn variants() -> [Self; #count] {
                [#(#variants)*]
            }

            #[inline(always)]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    #(#as_str_arms)*
                }
            }

            pub fn try_from_uint<U: Into<u64>>(value: U) -> Result<Self, &'static str> {
                let value: u64 = value.into();
                for v in Self::variants() {
                    if v as u64 == value {
                        return Ok(v);
                    }
                }
                Err("value does not match any variant")
            }
        }
    )
    .into()
}
