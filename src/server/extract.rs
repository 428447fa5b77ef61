//! Merged query/body parameter extraction.

use crate::auth::oauth::AuthParams;
use crate::server::AppError;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;

/// Query parameters merged with a form, multipart or JSON body.
///
/// Body values override query values with the same key.
#[derive(Clone, Debug, Default)]
pub struct RequestParams(pub AuthParams);

fn parse_urlencoded(input: &[u8]) -> AuthParams {
    url::form_urlencoded::parse(input).into_owned().collect()
}

fn parse_json(input: &[u8]) -> Result<AuthParams, AppError> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(input)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))?;
    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::String(s) => Some((key, s)),
            serde_json::Value::Number(n) => Some((key, n.to_string())),
            serde_json::Value::Bool(b) => Some((key, b.to_string())),
            _ => None,
        })
        .collect())
}

async fn parse_multipart(mut multipart: Multipart) -> Result<AuthParams, AppError> {
    let mut params = AuthParams::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if field.file_name().is_some() {
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        params.insert(name, value);
    }
    Ok(params)
}

impl<S> FromRequest<S> for RequestParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = req
            .uri()
            .query()
            .map(|q| parse_urlencoded(q.as_bytes()))
            .unwrap_or_default();

        if req.method() == Method::GET || req.method() == Method::HEAD {
            return Ok(Self(query));
        }

        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let body = if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            parse_multipart(multipart).await?
        } else {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            if bytes.is_empty() {
                AuthParams::new()
            } else if content_type.starts_with("application/json") {
                parse_json(&bytes)?
            } else {
                parse_urlencoded(&bytes)
            }
        };

        Ok(Self(query.merged_with(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    async fn extract(request: Request) -> AuthParams {
        RequestParams::from_request(request, &()).await.unwrap().0
    }

    #[tokio::test]
    async fn test_get_uses_query_only() {
        let request = Request::builder()
            .uri("/install?shop=a.myshopify.com&timestamp=1&embedded=1")
            .body(Body::empty())
            .unwrap();
        let params = extract(request).await;
        assert_eq!(params.get("shop"), Some("a.myshopify.com"));
        assert_eq!(params.get("embedded"), Some("1"));
    }

    #[tokio::test]
    async fn test_form_body_overrides_query() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/install?shop=query.myshopify.com&timestamp=1")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("shop=body.myshopify.com&host=abc%3D%3D"))
            .unwrap();
        let params = extract(request).await;
        assert_eq!(params.get("shop"), Some("body.myshopify.com"));
        assert_eq!(params.get("timestamp"), Some("1"));
        assert_eq!(params.get("host"), Some("abc=="));
    }

    #[tokio::test]
    async fn test_multipart_body_is_merged() {
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"shop\"\r\n\r\nmulti.myshopify.com\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"hmac\"\r\n\r\nabc\r\n--{boundary}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/install?timestamp=5")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let params = extract(request).await;
        assert_eq!(params.get("shop"), Some("multi.myshopify.com"));
        assert_eq!(params.get("hmac"), Some("abc"));
        assert_eq!(params.get("timestamp"), Some("5"));
    }

    #[tokio::test]
    async fn test_json_body_is_merged() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/shopify/disconnect")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"shop":"json.myshopify.com","n":3}"#))
            .unwrap();
        let params = extract(request).await;
        assert_eq!(params.get("shop"), Some("json.myshopify.com"));
        assert_eq!(params.get("n"), Some("3"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_rejected() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/shopify/disconnect")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = RequestParams::from_request(request, &()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
