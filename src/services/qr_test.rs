use super::*;
use crate::backend::http::http_client;
use crate::backend::http::test_server::{Reply, TestServer};
use crate::config::HttpTimeouts;

#[test]
fn signup_url_carries_slug() {
    assert_eq!(
        restaurant_signup_url("https://stamps.example.com/", "trattoria-da-luigi"),
        "https://stamps.example.com/?restaurant=trattoria-da-luigi"
    );
}

#[test]
fn restaurant_qr_url_encodes_signup_link() {
    let url = restaurant_qr_url("https://stamps.example.com", "luigi").unwrap();
    assert_eq!(
        url,
        "https://api.qrserver.com/v1/create-qr-code/?size=400x400&data=https%3A%2F%2Fstamps.example.com%2F%3Frestaurant%3Dluigi"
    );
}

#[test]
fn customer_qr_url_embeds_stamp_payload() {
    let id = Uuid::nil();
    let url = reqwest::Url::parse(&customer_qr_url(id, "Maria Schmidt").unwrap()).unwrap();
    let pairs: Vec<(String, String)> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();

    assert_eq!(pairs[0], ("size".to_string(), "300x300".to_string()));
    let payload: StampQrPayload = serde_json::from_str(&pairs[1].1).unwrap();
    assert_eq!(payload, StampQrPayload::new(id, "Maria Schmidt"));
}

#[test]
fn stamp_payload_uses_camel_case_keys() {
    let payload = StampQrPayload::new(Uuid::nil(), "Maria");
    let value: serde_json::Value = serde_json::from_str(&payload.to_json()).unwrap();
    assert_eq!(value["customerId"], "00000000-0000-0000-0000-000000000000");
    assert_eq!(value["customerName"], "Maria");
    assert_eq!(value["type"], "stamp");
}

#[test]
fn file_name_collapses_whitespace() {
    assert_eq!(qr_file_name("Trattoria da Luigi"), "Trattoria-da-Luigi-QR-Code.png");
    assert_eq!(qr_file_name("Café \t Central"), "Café-Central-QR-Code.png");
    assert_eq!(qr_file_name(" Sushi"), "-Sushi-QR-Code.png");
}

#[test]
fn file_name_never_leaves_target_directory() {
    assert_eq!(qr_file_name("Fish/Chips Bar"), "Fish-Chips-Bar-QR-Code.png");
    assert_eq!(qr_file_name(r"Fish\Chips"), "Fish-Chips-QR-Code.png");
    assert_eq!(qr_file_name("Bar: \"Zum Hirsch\"?"), "Bar-Zum-Hirsch-QR-Code.png");

    let dir = Path::new("/var/tmp");
    for name in ["/etc/evil", "../../etc/evil", "..", "a/../b"] {
        let path = dir.join(qr_file_name(name));
        assert_eq!(path.parent(), Some(dir), "{name}");
    }
}

#[tokio::test]
async fn download_with_separator_in_name_writes_inside_dir() {
    let server = TestServer::start(vec![Reply {
        status: 200,
        headers: vec![("content-type", "image/png".into())],
        body: "PNGDATA".into(),
        delay: None,
    }])
    .await;
    let http = http_client(HttpTimeouts { request_secs: 5, connect_secs: 2 }).unwrap();
    let dir = std::env::temp_dir().join(format!("stampcard-qr-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();

    let path = download_restaurant_qr(&http, &format!("{}/qr.png", server.base_url), "Fish/Chips Bar", &dir)
        .await
        .unwrap();

    assert_eq!(path, dir.join("Fish-Chips-Bar-QR-Code.png"));
    assert_eq!(std::fs::read(&path).unwrap(), b"PNGDATA");
    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn download_writes_image_bytes() {
    let server = TestServer::start(vec![Reply {
        status: 200,
        headers: vec![("content-type", "image/png".into())],
        body: "PNGDATA".into(),
        delay: None,
    }])
    .await;
    let http = http_client(HttpTimeouts { request_secs: 5, connect_secs: 2 }).unwrap();
    let dir = std::env::temp_dir().join(format!("stampcard-qr-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();

    let path = download_restaurant_qr(&http, &format!("{}/qr.png", server.base_url), "Trattoria da Luigi", &dir)
        .await
        .unwrap();

    assert_eq!(path.file_name().unwrap(), "Trattoria-da-Luigi-QR-Code.png");
    assert_eq!(std::fs::read(&path).unwrap(), b"PNGDATA");
    std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn download_failure_is_reported() {
    let server = TestServer::start(vec![Reply::json(502, serde_json::json!({ "message": "bad gateway" }))]).await;
    let http = http_client(HttpTimeouts { request_secs: 5, connect_secs: 2 }).unwrap();

    let err = download_restaurant_qr(&http, &server.base_url, "Luigi", &std::env::temp_dir())
        .await
        .unwrap_err();

    assert!(matches!(err, QrError::Download(BackendError::Status { status: 502, .. })));
}
