//! Procedural macros for Stacks
//!
//! - `mutation_result!` - Generate GraphQL mutation result types that carry a
//!   machine-readable error code alongside the message.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse::Parse, parse::ParseStream, parse_macro_input, Ident, Token, Type};

/// Generate a GraphQL mutation result type with `success`, `error`, `code`
/// and an optional entity field.
///
/// # Usage
///
/// ```ignore
/// // Simple result (success + error only)
/// mutation_result!(MutationResult);
///
/// // With entity field (any type, including generics)
/// mutation_result!(LoanResult, loan: Loan);
/// mutation_result!(CheckoutBatchResult, loans: Vec<Loan>);
/// ```
///
/// Every generated type also implements `From<crate::services::ServiceError>`,
/// so a resolver can finish with `Ok(result.unwrap_or_else(Into::into))`.
#[proc_macro]
pub fn mutation_result(input: TokenStream) -> TokenStream {
    let parsed = parse_macro_input!(input as MutationResultInput);

    let struct_name = &parsed.name;

    let output = if let Some((field_name, field_type)) = parsed.field {
        quote! {
            #[derive(Debug, Clone, async_graphql::SimpleObject)]
            pub struct #struct_name {
                pub success: bool,
                pub error: Option<String>,
                pub code: Option<String>,
                pub #field_name: Option<#field_type>,
            }

            impl #struct_name {
                pub fn success(#field_name: #field_type) -> Self {
                    Self {
                        success: true,
                        error: None,
                        code: None,
                        #field_name: Some(#field_name),
                    }
                }

                pub fn failure(code: &str, msg: impl Into<String>) -> Self {
                    Self {
                        success: false,
                        error: Some(msg.into()),
                        code: Some(code.to_string()),
                        #field_name: None,
                    }
                }
            }

            impl From<crate::services::ServiceError> for #struct_name {
                fn from(err: crate::services::ServiceError) -> Self {
                    Self::failure(err.code(), err.to_string())
                }
            }
        }
    } else {
        quote! {
            #[derive(Debug, Clone, async_graphql::SimpleObject)]
            pub struct #struct_name {
                pub success: bool,
                pub error: Option<String>,
                pub code: Option<String>,
            }

            impl #struct_name {
                pub fn success() -> Self {
                    Self {
                        success: true,
                        error: None,
                        code: None,
                    }
                }

                pub fn failure(code: &str, msg: impl Into<String>) -> Self {
                    Self {
                        success: false,
                        error: Some(msg.into()),
                        code: Some(code.to_string()),
                    }
                }
            }

            impl From<crate::services::ServiceError> for #struct_name {
                fn from(err: crate::services::ServiceError) -> Self {
                    Self::failure(err.code(), err.to_string())
                }
            }
        }
    };

    output.into()
}

/// Input for mutation_result! macro
struct MutationResultInput {
    name: Ident,
    field: Option<(Ident, Type)>,
}

impl Parse for MutationResultInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let name: Ident = input.parse()?;

        let field = if input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
            let field_name: Ident = input.parse()?;
            input.parse::<Token![:]>()?;
            let field_type: Type = input.parse()?;
            Some((field_name, field_type))
        } else {
            None
        };

        Ok(MutationResultInput { name, field })
    }
}
