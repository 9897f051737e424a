use std::fmt;

use proc_macro::TokenStream;
use quote::quote;

enum Visibility {
    Public(proc_macro2::Span),
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public(..) => "public",
            Self::Private => "private",
        }
        .fmt(f)
    }
}

impl syn::parse::Parse for Visibility {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let identifier = input.parse::<syn::Ident>()?;
        match identifier.to_string().as_str() {
            "public" => Ok(Self::Public(identifier.span())),
            "private" => Ok(Self::Private),
            _ => Err(syn::Error::new_spanned(
                identifier,
                "Unexpected visibility: expected `public` or `private`",
            )),
        }
    }
}

mod kw {
    syn::custom_keyword!(repr);
    syn::custom_keyword!(bits);
}

struct BitTagsArgs {
    visibility: Visibility,
    repr_type: syn::Type,
    bits: syn::LitInt,
}

impl syn::parse::Parse for BitTagsArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let visibility = input.parse()?;

        input.parse::<syn::Token![,]>().map_err(|mut error| {
            error.combine(syn::Error::new(
                input.span(),
                format!("Missing comma after `{}` visibility", visibility),
            ));
            error
        })?;

        input.parse::<kw::repr>().map_err(|mut error| {
            error.combine(syn::Error::new(
                input.span(),
                format!("Missing `repr` after `{},`", visibility),
            ));
            error
        })?;
        let repr_content;
        syn::parenthesized!(repr_content in input);
        let repr_type = repr_content.parse()?;

        input.parse::<syn::Token![,]>().map_err(|mut error| {
            error.combine(syn::Error::new(
                input.span(),
                "Missing comma before `bits(..)`",
            ));
            error
        })?;

        input.parse::<kw::bits>()?;
        let bits_content;
        syn::parenthesized!(bits_content in input);
        let bits = bits_content.parse()?;

        Ok(Self {
            visibility,
            repr_type,
            bits,
        })
    }
}

/// `JumpIfZero` becomes `JUMP_IF_ZERO`.
fn screaming_snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            result.push('_');
        }
        result.push(c.to_ascii_uppercase());
    }
    result
}

fn impl_bit_tags(
    enum_visibility: syn::Visibility,
    enum_name: syn::Ident,
    repr_type: syn::Type,
    bits: syn::LitInt,
    variants: impl Iterator<Item = syn::Variant>,
) -> proc_macro2::TokenStream {
    let width = match bits.base10_parse::<u32>() {
        Ok(width) if (1..usize::BITS).contains(&width) => width,
        Ok(_) => {
            return syn::Error::new_spanned(bits, "Tag width out of range")
                .into_compile_error();
        }
        Err(error) => return error.into_compile_error(),
    };
    let capacity = 1usize << width;

    let mut tag_idents = vec![];
    let mut tag_cases = vec![];
    let mut from_tag_cases = vec![];
    let mut all_unit = true;
    let mut discriminant = 0;

    for variant in variants {
        let variant_name = variant.ident;
        let tag_ident = quote::format_ident!(
            "{}_TAG",
            screaming_snake_case(&variant_name.to_string())
        );

        if let Some((_, custom_discriminant)) = variant.discriminant {
            match custom_discriminant {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Int(int_literal),
                    ..
                }) => match int_literal.base10_parse::<usize>() {
                    Ok(int_literal) => discriminant = int_literal,
                    Err(error) => {
                        return error.into_compile_error();
                    }
                },
                other => {
                    return syn::Error::new_spanned(
                        other,
                        "Only literal discriminants are allowed",
                    )
                    .into_compile_error();
                }
            }
        }

        if discriminant >= capacity {
            return syn::Error::new_spanned(
                &variant_name,
                format!(
                    "Tag {} of `{}` does not fit in {} bits",
                    discriminant, variant_name, width
                ),
            )
            .into_compile_error();
        }

        tag_idents.push(quote! {
            #[doc = concat!("`#[bit_tags]`-generated tag for the variant `Self::", stringify!(#variant_name), "`.")]
            #enum_visibility const #tag_ident: #repr_type = #discriminant as _;
        });

        match variant.fields {
            syn::Fields::Named(_) => {
                all_unit = false;
                tag_cases.push(quote! {
                    Self::#variant_name { .. } => Self::#tag_ident
                });
            }
            syn::Fields::Unnamed(_) => {
                all_unit = false;
                tag_cases.push(quote! {
                    Self::#variant_name(..) => Self::#tag_ident
                });
            }
            syn::Fields::Unit => {
                tag_cases.push(quote! {
                    Self::#variant_name => Self::#tag_ident
                });
                from_tag_cases.push(quote! {
                    Self::#tag_ident => Some(Self::#variant_name)
                });
            }
        }

        discriminant += 1;
    }

    let from_tag = all_unit.then(|| {
        quote! {
            #[doc = "`#[bit_tags]`-generated inverse of [`Self::tag`]. Bit patterns without a variant give `None`."]
            #enum_visibility const fn from_tag(tag: #repr_type) -> Option<Self> {
                match tag {
                    #(#from_tag_cases,)*
                    _ => None,
                }
            }
        }
    });
    let width = width as usize;

    quote! {
        impl #enum_name {
            #(#tag_idents)*

            #[doc = "Width in bits of every tag of this enum."]
            #enum_visibility const TAG_BITS: usize = #width;

            #[doc = "`#[bit_tags]`-generated getter for this variant's tag."]
            #enum_visibility const fn tag(&self) -> #repr_type {
                match self {
                    #(#tag_cases),*
                }
            }

            #from_tag
        }
    }
}

/// Constructs an `impl` for the given `enum` with a constant for the bit
/// pattern of each variant, the tag width, and (for enums made only of unit
/// variants) a checked conversion back from a raw pattern.
///
/// Usage examples:
///
/// * `#[bit_tags(public, repr(u8), bits(4))]`
/// * `#[bit_tags(private, repr(u16), bits(2))]`
///
/// Every discriminant must fit in the given number of bits; a variant that
/// does not is a compile error pointing at that variant.
#[proc_macro_attribute]
pub fn bit_tags(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(args as BitTagsArgs);

    let input_item = syn::parse_macro_input!(input as syn::DeriveInput);
    let input_item_cloned = input_item.clone();

    let data_enum = match input_item.data {
        syn::Data::Enum(data_enum) => data_enum,
        syn::Data::Struct(syn::DataStruct {
            struct_token: syn::token::Struct { span },
            ..
        })
        | syn::Data::Union(syn::DataUnion {
            union_token: syn::token::Union { span },
            ..
        }) => {
            return syn::Error::new(span, "Item must be an `enum`")
                .into_compile_error()
                .into();
        }
    };

    let visibility = match args.visibility {
        Visibility::Public(span) => {
            syn::Visibility::Public(syn::token::Pub { span })
        }
        Visibility::Private => syn::Visibility::Inherited,
    };

    let tags_impl = impl_bit_tags(
        visibility,
        input_item.ident,
        args.repr_type,
        args.bits,
        data_enum.variants.into_iter(),
    );

    quote! {
        #input_item_cloned

        #tags_impl
    }
    .into()
}
