use axum::http::StatusCode;
use axum::response::IntoResponse;

use session_board::AppError;

#[test]
fn status_codes_follow_variant() {
    assert_eq!(
        AppError::NotFound("x".into()).status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        AppError::InvalidTransition("x".into()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::BadRequest("x".into()).status_code(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        AppError::Process("x".into()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn display_prefixes_category() {
    assert_eq!(
        AppError::NotFound("session a not found".into()).to_string(),
        "not found: session a not found"
    );
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
}

#[test]
fn toml_errors_become_config_errors() {
    let err: AppError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn io_errors_convert() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
    assert!(matches!(err, AppError::Io(ref msg) if msg == "disk"));
}

#[test]
fn into_response_uses_status_code() {
    let response = AppError::NotFound("gone".into()).into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
