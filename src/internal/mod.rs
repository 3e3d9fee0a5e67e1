pub(crate) mod code_verifier_manager;
pub(crate) mod csrf_token_manager;
pub(crate) mod token_manager;
pub mod token_store;
