pub(crate) mod binder;
pub(crate) mod credential;
pub(crate) mod github;
pub(crate) mod jwks;
pub(crate) mod pipeline;
pub(crate) mod verifier;
