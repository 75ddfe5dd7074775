use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one running on a
/// multi-threaded runtime, over a server backed by a fresh in-memory store
/// and in-memory ledger.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::coordinator::Coordinator`, `crate::store::MemoryStore` and
/// `crate::ledger::MemoryLedger`, all sharing the same state.
///
/// `#[backend_test(offline)]` builds the server without ledger enforcement;
/// the injected `MemoryLedger` is then never called.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the injected arguments and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Decide whether the ledger is enforced.
    let enforce_ledger = match parse_macro_input!(args as Option<Ident>) {
        None => true,
        Some(arg) if arg == "offline" => false,
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument or `offline`")
                .into_compile_error()
                .into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Rewrite the test function.
    quote! {
        #[test]
        #[allow(unused_variables)]
        fn #name() {
            log4rs_test_utils::test_logging::init_logging_once_for(
                ["dualvote_backend"],
                None,
                None,
            );

            /// The test itself.
            #item_fn

            // Votes race each other in some tests, so give them real threads.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let store = crate::store::MemoryStore::new();
                let ledger = crate::ledger::MemoryLedger::new();
                let rocket = crate::rocket_for_test(store.clone(), ledger.clone(), #enforce_ledger);
                let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();
                let coordinator = rocket_client
                    .rocket()
                    .state::<crate::coordinator::Coordinator>()
                    .unwrap()
                    .clone();

                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, map its parameters to the injected
/// values, and reject unknown or repeated parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen: Vec<String> = vec![];
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(type_ident) = type_path.path.segments.last().map(|s| &s.ident) {
                    let injected = match type_ident.to_string().as_str() {
                        "Client" => Some(quote! { rocket_client }),
                        "Coordinator" => Some(quote! { coordinator.clone() }),
                        "MemoryStore" => Some(quote! { store.clone() }),
                        "MemoryLedger" => Some(quote! { ledger.clone() }),
                        _ => None,
                    };
                    if let Some(injected) = injected {
                        let type_name = type_ident.to_string();
                        if seen.contains(&type_name) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{type_name}`"),
                            ));
                        }
                        seen.push(type_name);
                        args.push(injected);
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client: Client`, `coordinator: Coordinator`, `store: MemoryStore` or `ledger: MemoryLedger`",
        ));
    }

    Ok(args)
}
