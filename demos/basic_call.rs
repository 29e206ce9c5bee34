//! Basic example calling a public JSON API through a declarative endpoint map.
//!
//! This example shows how to:
//! - Load the endpoint map from a JSON document
//! - Call endpoints with path, query and body parameters
//! - Inspect retries, error status and interceptor output
//! - Read the stack trace log
//!
//! Run with: `cargo run --example basic_call`

use apiengine::interceptor::ResponseInterceptor;
use apiengine::{ApiConstants, ApiEngine, CallParameters, EndpointDefinition, Error, ErrorMessage};
use serde_json::{json, Map};
use std::time::Duration;

const CONSTANTS: &str = r#"{
    "baseUrl": "https://jsonplaceholder.typicode.com",
    "globalParams": {
        "request": { "method": "GET", "headers": { "accept": "application/json" } },
        "retry": 2,
        "retryCondition": [500, 502, 503],
        "errorMessages": [
            { "statusCode": 404, "code": "NOT_FOUND", "message": "Resource not found" }
        ],
        "stackTraceLogExtraParams": { "app": "basic_call" }
    },
    "endpoints": {
        "getPost": { "path": "/posts/{id}" },
        "getPosts": { "path": "/posts?userId={userId}&title={title}" },
        "createPost": {
            "path": "/posts",
            "request": {
                "method": "POST",
                "headers": { "content-type": "application/json; charset=UTF-8" },
                "body": { "userId": 1 }
            }
        }
    }
}"#;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("apiengine=debug,basic_call=info")
        .init();

    let mut constants = ApiConstants::from_json(CONSTANTS)?;

    // Callbacks cannot live in JSON; attach them in code.
    let summary = ResponseInterceptor::from_fn(|result| {
        let mut out = Map::new();
        out.insert("status".into(), json!(result.response.status.as_u16()));
        out.insert("retried".into(), json!(result.was_retried()));
        Ok(Some(out))
    });
    constants = constants.endpoint(
        "getMissingPost",
        EndpointDefinition::new("/posts/{id}")
            .error_message(ErrorMessage::new(404, "POST_NOT_FOUND", "No such post"))
            .response_interceptor(summary),
    );

    let engine = ApiEngine::builder()
        .constants(constants)
        .timeout(Duration::from_secs(10))
        .on_stack_trace(|entry| {
            println!(
                "  [trace] {} {} -> {:?}",
                entry.request_method, entry.request_url, entry.status_code
            );
        })
        .build()?;

    println!("Endpoints: {:?}", engine.endpoint_names().keys().collect::<Vec<_>>());

    println!("\n=== GET with path parameter ===");
    let post = engine
        .call("getPost", Some(CallParameters::new().param("id", "1")))
        .await?;
    println!("Status: {}", post.response.status);
    println!("Title: {}", post.response_body["title"]);

    println!("\n=== GET with partially filled query ===");
    let posts = engine
        .call("getPosts", Some(CallParameters::new().param("userId", "1")))
        .await?;
    let count = posts.response_body.as_array().map_or(0, Vec::len);
    println!("Posts by user 1: {}", count);

    println!("\n=== POST with merged body ===");
    let created = engine
        .call(
            "createPost",
            Some(CallParameters::new().body(json!({ "title": "foo", "body": "bar" }))),
        )
        .await?;
    println!("Status: {}", created.response.status);
    println!("Created: {}", created.response_body);

    println!("\n=== Error status ===");
    let missing = engine
        .call("getMissingPost", Some(CallParameters::new().param("id", "0")))
        .await?;
    println!(
        "Status: {} is_error={} code={:?} message={:?}",
        missing.response.status,
        missing.error_status.is_error,
        missing.error_status.code,
        missing.error_status.message
    );
    println!("Interceptor response: {:?}", missing.interceptor_response);

    println!("\n=== Unknown endpoint ===");
    match engine.call("getComments", None).await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("Error: {}", e),
    }

    println!("\n=== Stack trace log ===");
    for entry in engine.stack_trace_log() {
        let latency = entry.end_timestamp - entry.start_timestamp;
        println!(
            "{} {} -> {:?} in {}ms {}",
            entry.request_method,
            entry.request_url,
            entry.status_code,
            latency.num_milliseconds(),
            serde_json::Value::Object(entry.extra_properties)
        );
    }

    Ok(())
}
