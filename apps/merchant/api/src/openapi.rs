use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Merchant Onboarding API", description = "Merchant registration and sessions")
)]
struct ServiceDoc;

/// The service document with the domain paths merged in.
pub fn api_doc() -> utoipa::openapi::OpenApi {
    let mut doc = domain_merchants::handlers::ApiDoc::openapi();
    doc.info = ServiceDoc::openapi().info;
    BearerAuth.modify(&mut doc);
    doc
}
