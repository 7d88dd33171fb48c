use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{Map, Value};

use crate::plants::{ApiError, PlantSubmission};
use crate::storage::ImageUpload;

/// Multipart field carrying the uploaded file.
pub const IMAGE_FIELD: &str = "image";

/// Body limit hits become 413; anything else about the body is a 400.
fn body_error(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(text)
    }
}

fn multipart_error(e: MultipartError) -> ApiError {
    body_error(e.status(), e.body_text())
}

async fn read_multipart(mut multipart: Multipart) -> Result<PlantSubmission, ApiError> {
    let mut fields = Map::new();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == IMAGE_FIELD {
            let Some(file_name) = field.file_name().map(str::to_string) else {
                return Err(ApiError::BadRequest(format!(
                    "Field {IMAGE_FIELD} must be a file upload"
                )));
            };
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            // browsers send an empty part when no file was picked
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            image = Some(ImageUpload {
                file_name,
                content_type,
                bytes,
            });
        } else if !name.is_empty() {
            let text = field.text().await.map_err(multipart_error)?;
            fields.insert(name, Value::String(text));
        }
    }

    Ok(PlantSubmission::new(fields, image))
}

/// Accepts `multipart/form-data` (text fields plus an optional `image` file)
/// or a JSON object. An empty body is an empty submission.
impl<S> FromRequest<S> for PlantSubmission
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| body_error(e.status(), e.body_text()))?;
            return read_multipart(multipart).await;
        }

        if content_type.starts_with("application/json") {
            let Json(fields) = Json::<Map<String, Value>>::from_request(req, state)
                .await
                .map_err(|e| body_error(e.status(), e.body_text()))?;
            return Ok(PlantSubmission::new(fields, None));
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| body_error(e.status(), e.body_text()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            Ok(PlantSubmission::default())
        } else {
            Err(ApiError::BadRequest(
                "Expected a multipart/form-data or application/json body".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    async fn extract(content_type: Option<&str>, body: impl Into<Body>) -> Result<PlantSubmission, ApiError> {
        let mut builder = Request::builder().method("POST").uri("/plants");
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        PlantSubmission::from_request(builder.body(body.into()).unwrap(), &()).await
    }

    #[tokio::test]
    async fn test_multipart_fields_and_image() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"name\"\r\n\r\n\
            Rose\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"image\"; filename=\"rose.png\"\r\n\
            Content-Type: image/png\r\n\r\n\
            PNGDATA\r\n\
            --XYZ--\r\n";
        let submission = extract(Some("multipart/form-data; boundary=XYZ"), body).await.unwrap();

        assert_eq!(submission.fields["name"], "Rose");
        let image = submission.image.unwrap();
        assert_eq!(image.file_name, "rose.png");
        assert_eq!(image.content_type.as_deref(), Some("image/png"));
        assert_eq!(&image.bytes[..], b"PNGDATA");
    }

    #[tokio::test]
    async fn test_multipart_empty_file_part_is_no_image() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"image\"; filename=\"\"\r\n\
            Content-Type: application/octet-stream\r\n\r\n\
            \r\n\
            --XYZ--\r\n";
        let submission = extract(Some("multipart/form-data; boundary=XYZ"), body).await.unwrap();
        assert!(submission.image.is_none());
        assert!(submission.fields.is_empty());
    }

    #[tokio::test]
    async fn test_multipart_image_text_part_rejected() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"image\"\r\n\r\n\
            https://example.com/rose.png\r\n\
            --XYZ--\r\n";
        let err = extract(Some("multipart/form-data; boundary=XYZ"), body).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref msg) if msg.contains("file upload")));
    }

    #[tokio::test]
    async fn test_json_object() {
        let submission = extract(Some("application/json"), r#"{"name":"Fern","height":12}"#)
            .await
            .unwrap();
        assert_eq!(submission.fields["name"], "Fern");
        assert_eq!(submission.fields["height"], 12);
        assert!(submission.image.is_none());
    }

    #[tokio::test]
    async fn test_json_array_rejected() {
        let err = extract(Some("application/json"), "[1,2]").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_body_without_content_type() {
        let submission = extract(None, Body::empty()).await.unwrap();
        assert!(submission.fields.is_empty());
        assert!(submission.image.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_body() {
        let err = extract(Some("text/plain"), "name=Rose").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
