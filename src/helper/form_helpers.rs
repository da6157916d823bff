use crate::helper::{ServiceError, ServiceResult};
use actix_multipart::Field;
use actix_web::web::{self, BytesMut};
use futures_util::StreamExt;
use url::form_urlencoded;

/// Parses URL-encoded form data from bytes, keeping repeated keys in order.
pub fn parse_form(form_bytes: &web::Bytes) -> ServiceResult<Vec<(String, String)>> {
    let body = std::str::from_utf8(form_bytes)
        .map_err(|_| ServiceError::Validation("Invalid UTF-8 in request body.".to_string()))?;
    Ok(form_urlencoded::parse(body.as_bytes()).into_owned().collect())
}

/// Comma-separated list, trimmed, without empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|item| item.trim().to_string()).filter(|item| !item.is_empty()).collect()
}

pub fn parse_bool(value: Option<&str>) -> bool {
    matches!(value.map(|v| v.trim().to_ascii_lowercase()).as_deref(), Some("true" | "1" | "on" | "yes"))
}

/// Reads a whole multipart field, failing once it exceeds `max_bytes`.
pub async fn read_field_bytes(field: &mut Field, max_bytes: usize) -> ServiceResult<Vec<u8>> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk?;
        if data.len() + chunk.len() > max_bytes {
            return Err(ServiceError::TooLarge(format!("field exceeds {} bytes", max_bytes)));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data.to_vec())
}

pub async fn read_text_field(field: &mut Field, max_bytes: usize) -> ServiceResult<String> {
    let bytes = read_field_bytes(field, max_bytes).await?;
    String::from_utf8(bytes).map_err(|_| ServiceError::Validation("Invalid UTF-8 in form field.".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlencoded_form() {
        let form = parse_form(&web::Bytes::from_static(b"title=Hello+World&tags=a%2Cb&tags=c")).unwrap();
        assert_eq!(form[0], ("title".to_string(), "Hello World".to_string()));
        assert_eq!(split_list(&form[1].1), vec!["a", "b"]);
        assert_eq!(form[2].1, "c");
    }

    #[test]
    fn list_and_bool_helpers() {
        assert_eq!(split_list(" rust, ,actix "), vec!["rust", "actix"]);
        assert!(parse_bool(Some("on")));
        assert!(!parse_bool(Some("no")));
        assert!(!parse_bool(None));
    }
}
