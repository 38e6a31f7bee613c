//! HTTP clients for external image and video generation providers.
//!
//! Each provider speaks one of two status vocabularies ([`Dialect`]). The
//! vocabularies are normalised into [`ProviderStatus`] at this boundary so
//! nothing above the provider layer sees provider-specific strings.

pub mod api;
pub mod error;
pub mod provider;
pub mod request;
pub mod status;

pub use api::{Dialect, ProviderApi};
pub use error::ProviderError;
pub use provider::GenerationProvider;
pub use request::{GenerationRequest, Submission};
pub use status::ProviderStatus;
