use anyhow::Context;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::Request;
use std::collections::HashMap;

/// Decoded `application/x-www-form-urlencoded` body
#[derive(Debug, Clone, Default)]
pub struct Form {
    fields: HashMap<String, String>,
}

impl Form {
    pub fn parse(body: &str) -> Self {
        let mut fields = HashMap::new();

        for param in body.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            // First occurrence wins
            fields.entry(decode(key)).or_insert_with(|| decode(value));
        }

        Self { fields }
    }

    /// Raw field value, possibly empty
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Field value, treating an empty submission as missing
    pub fn required(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Largest form body accepted, in bytes
pub const MAX_FORM_BYTES: usize = 16 * 1024;

/// Error type of request bodies the forms can be read from
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reads the request body, up to [`MAX_FORM_BYTES`], and parses it as a form
pub async fn read_form<B>(req: Request<B>) -> anyhow::Result<Form>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let body_bytes = Limited::new(req.into_body(), MAX_FORM_BYTES)
        .collect()
        .await
        .map_err(|e| anyhow::anyhow!("failed to read request body: {}", e))?
        .to_bytes();

    let body_str = std::str::from_utf8(&body_bytes).context("form body is not valid UTF-8")?;
    Ok(Form::parse(body_str))
}
