pub mod anonymity_resolver;

pub use anonymity_resolver::AnonymityResolver;
