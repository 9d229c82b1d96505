use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, ItemFn, LitStr};

const DEFAULT_FILTER: &str = "rxflow=debug";

/// Marks a synchronous test and installs a `tracing` subscriber that writes
/// through the libtest capture.
///
/// An optional string literal overrides the filter directive:
/// `#[rxflow_macro::test("rxflow=trace")]`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let mut input = parse_macro_input!(item as ItemFn);

  if input.sig.asyncness.is_some() {
    return TokenStream::from(
      syn::Error::new(
        input.sig.fn_token.span(),
        "rxflow_macro::test only supports synchronous tests. Drive futures with \
         futures::executor::block_on inside the test body.",
      )
      .to_compile_error(),
    );
  }

  let raw_args = proc_macro2::TokenStream::from(attr);
  let filter = if raw_args.is_empty() {
    DEFAULT_FILTER.to_string()
  } else {
    match syn::parse2::<LitStr>(raw_args.clone()) {
      Ok(lit) => lit.value(),
      Err(_) => {
        return TokenStream::from(
          syn::Error::new(
            raw_args.span(),
            "rxflow_macro::test only accepts: #[rxflow_macro::test] or \
             #[rxflow_macro::test(\"<filter directive>\")]",
          )
          .to_compile_error(),
        );
      }
    }
  };

  let body = &input.block;
  let new_body: syn::Block = syn::parse_quote!({
    let _ = ::tracing_subscriber::fmt()
      .with_env_filter(::tracing_subscriber::EnvFilter::new(#filter))
      .with_test_writer()
      .try_init();
    #body
  });
  *input.block = new_body;

  let expanded = quote! {
      #[test]
      #input
  };

  TokenStream::from(expanded)
}
