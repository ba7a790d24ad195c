//! E2E tests: FA diagram upload and transcription.

use actix_web::test;
use serde_json::Value;

use super::mock_llm_provider::MockLlmProvider;
use super::test_helpers::*;

const BOUNDARY: &str = "----tara-test-boundary";

fn png_bytes(len: usize) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
    data.resize(len.max(data.len()), 0);
    data
}

/// Build a multipart body with a single file field.
fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn upload<S>(app: &S, body: Vec<u8>) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let req = test::TestRequest::post()
        .uri("/api/fa-transcriber/transcribe")
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status().as_u16();
    (status, test::read_body_json(resp).await)
}

#[actix_rt::test]
async fn test_transcribe_stores_rows() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.reply(
        "```json\n[\n  {\"Sheet Name\": \"FA-01\", \"Message\": \"WheelSpeed\", \"Start ECU\": \"ABS\", \
         \"End ECU\": \"ESC\", \"Sending ECU\": \"ABS\", \"Receiving ECU\": \"ESC\", \"Dashed Line\": \"No\"},\n  \
         {\"sheet_name\": \"FA-01\", \"message\": \"Diag\", \"start_ecu\": \"GW\", \"end_ecu\": null}\n]\n```",
    );
    let (status, body) = upload(
        &app,
        multipart_body("image", "fa.png", "image/png", &png_bytes(256)),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["success"], true);
    assert!(body.get("warning").is_none());
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["message"], "WheelSpeed");
    assert_eq!(items[0]["receiving_ecu"], "ESC");
    assert_eq!(items[1]["end_ecu"], "");

    // The image travels as a base64 data URI part
    let request = &mock.requests()[0];
    let parts = request["messages"][1]["content"].as_array().unwrap();
    assert_eq!(parts[0]["type"], "text");
    assert_eq!(parts[1]["type"], "image_url");
    assert!(
        parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );

    let transcription_id = body["transcription_id"].as_i64().unwrap();
    let image_id = body["image_id"].as_i64().unwrap();

    let (status, stored) = get_json(
        &app,
        &format!("/api/fa-transcriber/transcriptions/{}", transcription_id),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(stored["transcription"]["items"].as_array().unwrap().len(), 2);

    let (status, runs) = get_json(
        &app,
        &format!("/api/fa-transcriber/images/{}/transcriptions", image_id),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(runs["transcriptions"].as_array().unwrap().len(), 1);
}

#[actix_rt::test]
async fn test_malformed_output_is_a_warning() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    mock.reply("I could not read the diagram, sorry.");
    let (status, body) = upload(
        &app,
        multipart_body("image", "fa.png", "image/png", &png_bytes(64)),
    )
    .await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["success"], true);
    assert!(body["items"].as_array().unwrap().is_empty());
    assert!(body["warning"].is_string());

    let (status, stored) = get_json(
        &app,
        &format!(
            "/api/fa-transcriber/transcriptions/{}",
            body["transcription_id"]
        ),
    )
    .await;
    assert_eq!(status, 200);
    assert!(stored["transcription"]["items"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_rejected_uploads_do_not_call_provider() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    // Unsupported type
    let (status, body) = upload(
        &app,
        multipart_body("image", "fa.pdf", "application/pdf", b"%PDF-1.7 not an image"),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_INPUT");

    // Over the size limit
    let (status, _) = upload(
        &app,
        multipart_body(
            "image",
            "big.png",
            "image/png",
            &png_bytes(TEST_MAX_UPLOAD_SIZE + 1),
        ),
    )
    .await;
    assert_eq!(status, 400);

    // Wrong field name
    let (status, _) = upload(
        &app,
        multipart_body("file", "fa.png", "image/png", &png_bytes(64)),
    )
    .await;
    assert_eq!(status, 400);

    // Empty file
    let (status, _) = upload(&app, multipart_body("image", "fa.png", "image/png", b"")).await;
    assert_eq!(status, 400);

    assert!(mock.requests().is_empty());
}

#[actix_rt::test]
async fn test_unknown_transcription_and_image() {
    let mock = MockLlmProvider::start();
    let pool = create_test_pool().await;
    let app = create_test_app(&pool, &mock, passing_runner()).await;

    let (status, body) = get_json(&app, "/api/fa-transcriber/transcriptions/99").await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = get_json(&app, "/api/fa-transcriber/images/99/transcriptions").await;
    assert_eq!(status, 404);
}
