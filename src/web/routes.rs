use actix_web::web;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/chat", web::post().to(handlers::chat))
            .route("/history", web::get().to(handlers::history))
            .route("/session", web::delete().to(handlers::reset_session))
            .service(
                web::resource("/document")
                    .route(web::get().to(handlers::document_preview))
                    .route(web::post().to(handlers::upload_document)),
            ),
    )
    .route("/", web::get().to(handlers::index))
    .route("/health", web::get().to(handlers::health_check));
}
