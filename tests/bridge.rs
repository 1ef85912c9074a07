mod common;

use actix_web::{App, HttpResponse, test, web};
use actix_web_middleware_apilog::AccessLogger;
use log::LevelFilter;

use common::json_logger;

// The `log` backend is process-wide, so everything touching it lives in one test.
#[actix_web::test]
async fn test_log_facade_shares_the_logger() {
    let (logger, writer) = json_logger();
    logger.try_init().unwrap();
    assert!(logger.try_init().is_err());

    log::info!(user = "alice"; "hello {}", "world");
    log::debug!("below threshold");

    let entries = writer.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["message"], "hello world");
    assert_eq!(entries[0]["kv"], r#"{"user":"alice"}"#);
    assert_eq!(entries[0]["level"], "INFO");

    logger.set_level(LevelFilter::Debug);
    log::debug!("now visible");
    assert_eq!(writer.entries().len(), 2);
    logger.set_level(LevelFilter::Info);

    let app = test::init_service(
        App::new()
            .wrap(AccessLogger::new(logger.clone()))
            .route(
                "/",
                web::get().to(|| async {
                    log::warn!("from handler");
                    HttpResponse::Ok().finish()
                }),
            ),
    )
    .await;
    let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    test::read_body(res).await;

    let messages: Vec<String> = writer
        .entries()
        .iter()
        .skip(2)
        .map(|e| e["message"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(messages, ["REQUEST", "from handler", "RESPONSE"]);
}
