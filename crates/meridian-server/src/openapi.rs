use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Meridian API",
        version = "0.1.0",
        description = "Job submission and worker status for the map listing harvester."
    ),
    paths(
        crate::routes::submit,
        crate::routes::get_job,
        crate::routes::list_workers,
        crate::routes::queue_lengths,
        crate::routes::clear_queues,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::SubmitJobRequest,
        crate::dto::PartRequest,
        crate::dto::SubmitJobResponse,
        crate::dto::JobResponse,
        crate::dto::WorkersResponse,
        crate::dto::WorkerResponse,
        crate::dto::QueuesResponse,
        crate::dto::ClearQueuesResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "jobs", description = "Job submission and progress"),
        (name = "workers", description = "Worker pool status"),
        (name = "queues", description = "Queue lane inspection"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the bearer scheme referenced by the `/v1` routes.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .description(Some("Set via the MERIDIAN_ADMIN_TOKEN environment variable."))
                        .build(),
                ),
            );
        }
    }
}
