//! Request extractors shared by the HTTP services.

pub mod validated_json;

pub use validated_json::ValidatedJson;
