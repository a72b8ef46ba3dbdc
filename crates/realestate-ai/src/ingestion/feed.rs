use std::sync::OnceLock;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value};
use tracing::debug;

use super::IngestionError;

/// One untyped record from a partner feed.
pub type RawItem = Map<String, Value>;

const FEED_ACCEPT: &str = "application/json, application/xml, text/xml";
const JSON_COLLECTION_KEYS: &[&str] = &["listings", "items", "data", "results"];
/// xml2js-style key for element text that sits next to attributes or children.
pub(crate) const XML_TEXT_KEY: &str = "_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Json,
    Xml,
}

impl FeedFormat {
    pub fn label(self) -> &'static str {
        match self {
            FeedFormat::Json => "json",
            FeedFormat::Xml => "xml",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedResult {
    pub items: Vec<RawItem>,
    pub format: FeedFormat,
}

fn record_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)listing|item").expect("static regex"))
}

fn strip_bom(input: &str) -> &str {
    input.strip_prefix('\u{feff}').unwrap_or(input)
}

/// Drops nulls, unwraps single-element arrays, and recurses into objects.
pub fn sanitise_record(input: &Value) -> RawItem {
    let Value::Object(fields) = input else {
        return RawItem::new();
    };

    let mut clean = RawItem::new();
    for (key, value) in fields {
        let value = match value {
            Value::Null => continue,
            Value::Array(entries) if entries.len() == 1 => sanitise_value(&entries[0]),
            Value::Array(entries) => Value::Array(entries.iter().map(sanitise_value).collect()),
            other => sanitise_value(other),
        };
        clean.insert(key.clone(), value);
    }
    clean
}

fn sanitise_value(value: &Value) -> Value {
    match value {
        Value::Object(_) => Value::Object(sanitise_record(value)),
        other => other.clone(),
    }
}

/// Walks a parsed feed to the records it carries.
pub fn extract_records(value: &Value, depth: usize) -> Vec<RawItem> {
    match value {
        Value::Array(entries) => entries
            .iter()
            .flat_map(|entry| extract_records(entry, depth + 1))
            .collect(),
        Value::Object(fields) => {
            if let Some((_, nested)) = fields
                .iter()
                .find(|(key, _)| record_key_pattern().is_match(key))
            {
                return extract_records(nested, depth + 1);
            }
            if depth == 0 && fields.len() == 1 {
                if let Some(only) = fields.values().next() {
                    return extract_records(only, depth + 1);
                }
            }
            vec![sanitise_record(value)]
        }
        _ => Vec::new(),
    }
}

fn parse_json_feed(payload: &str) -> Result<Vec<RawItem>, IngestionError> {
    let cleaned = strip_bom(payload).trim();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    let parsed: Value = serde_json::from_str(cleaned)?;
    Ok(match &parsed {
        Value::Array(entries) => entries.iter().map(sanitise_record).collect(),
        Value::Object(fields) => JSON_COLLECTION_KEYS
            .iter()
            .find_map(|key| fields.get(*key))
            .map(|collection| extract_records(collection, 0))
            .unwrap_or_else(|| vec![sanitise_record(&parsed)]),
        _ => Vec::new(),
    })
}

struct XmlNode {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl XmlNode {
    fn open(start: &BytesStart<'_>) -> Result<Self, IngestionError> {
        let mut fields = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            insert_field(&mut fields, key, Value::String(value));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            fields,
            text: String::new(),
        })
    }

    fn finish(mut self) -> (String, Value) {
        let text = self.text.trim().to_string();
        if self.fields.is_empty() {
            return (self.name, Value::String(text));
        }
        if !text.is_empty() {
            self.fields.insert(XML_TEXT_KEY.to_string(), Value::String(text));
        }
        (self.name, Value::Object(self.fields))
    }
}

/// Repeated keys collect into an array.
fn insert_field(fields: &mut Map<String, Value>, key: String, value: Value) {
    match fields.get_mut(&key) {
        Some(Value::Array(existing)) => existing.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            fields.insert(key, value);
        }
    }
}

/// Converts XML into a JSON tree: attributes merge into the element object,
/// text-only elements become strings, and repeated children become arrays.
pub fn xml_to_value(payload: &str) -> Result<Value, IngestionError> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = Map::new();
    let mut attach = |stack: &mut Vec<XmlNode>, (name, value): (String, Value)| match stack
        .last_mut()
    {
        Some(parent) => insert_field(&mut parent.fields, name, value),
        None => insert_field(&mut root, name, value),
    };

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(XmlNode::open(&start)?),
            Event::Empty(start) => {
                let node = XmlNode::open(&start)?;
                attach(&mut stack, node.finish());
            }
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, node.finish());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    drop(attach);
    Ok(Value::Object(root))
}

fn parse_xml_feed(payload: &str) -> Result<Vec<RawItem>, IngestionError> {
    let cleaned = strip_bom(payload).trim();
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }
    Ok(extract_records(&xml_to_value(cleaned)?, 0))
}

/// JSON when the content type says so or the body looks like JSON, else XML.
pub fn parse_feed(content_type: &str, payload: &str) -> Result<FeedResult, IngestionError> {
    let trimmed = strip_bom(payload).trim_start();
    let looks_json =
        content_type.contains("json") || trimmed.starts_with('{') || trimmed.starts_with('[');
    if looks_json {
        Ok(FeedResult {
            items: parse_json_feed(payload)?,
            format: FeedFormat::Json,
        })
    } else {
        Ok(FeedResult {
            items: parse_xml_feed(payload)?,
            format: FeedFormat::Xml,
        })
    }
}

pub async fn fetch_feed(
    client: &reqwest::Client,
    source_url: &str,
) -> Result<FeedResult, IngestionError> {
    if source_url.trim().is_empty() {
        return Err(IngestionError::MissingSource);
    }

    let response = client
        .get(source_url)
        .header(ACCEPT, FEED_ACCEPT)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(IngestionError::FeedStatus {
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let payload = response.text().await?;
    let result = parse_feed(&content_type, &payload)?;
    debug!(
        items = result.items.len(),
        format = result.format.label(),
        "ingestion.feed fetched"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn json_arrays_are_sanitised() {
        let feed = parse_feed(
            "application/json",
            "\u{feff}[{\"title\": \"A\", \"agent\": null, \"tags\": [\"one\"]}]",
        )
        .expect("parsed");
        assert_eq!(feed.format, FeedFormat::Json);
        assert_eq!(feed.items.len(), 1);
        assert_eq!(Value::Object(feed.items[0].clone()), json!({ "title": "A", "tags": "one" }));
    }

    #[test]
    fn json_objects_use_the_first_collection_key() {
        let feed = parse_feed(
            "text/plain",
            r#"{"meta": {"page": 1}, "results": [{"title": "A"}, {"title": "B"}]}"#,
        )
        .expect("parsed");
        assert_eq!(feed.format, FeedFormat::Json);
        assert_eq!(feed.items.len(), 2);

        let single = parse_feed("application/json", r#"{"title": "Solo"}"#).expect("parsed");
        assert_eq!(single.items.len(), 1);
        assert_eq!(single.items[0]["title"], "Solo");
    }

    #[test]
    fn xml_feeds_become_records() {
        let xml = r#"<?xml version="1.0"?>
            <feed>
              <listing id="L1">
                <title>Marina 1BR</title>
                <price>1,200,000</price>
                <location><lat>25.08</lat><lng>55.14</lng></location>
              </listing>
              <listing id="L2">
                <title><![CDATA[Villa & garden]]></title>
                <price>4500000</price>
              </listing>
            </feed>"#;
        let feed = parse_feed("application/xml", xml).expect("parsed");
        assert_eq!(feed.format, FeedFormat::Xml);
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[0]["id"], "L1");
        assert_eq!(feed.items[0]["price"], "1,200,000");
        assert_eq!(feed.items[0]["location"]["lng"], "55.14");
        assert_eq!(feed.items[1]["title"], "Villa & garden");
    }

    #[test]
    fn xml_single_listing_is_one_record() {
        let xml = "<listings><listing><title>Only</title></listing></listings>";
        let feed = parse_feed("text/xml", xml).expect("parsed");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0]["title"], "Only");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = parse_feed("application/json", "{not json").expect_err("malformed");
        assert!(matches!(err, IngestionError::Json(_)));
    }

    #[tokio::test]
    async fn fetch_sends_accept_and_rejects_failures() {
        let server = MockServer::start_async().await;
        let ok = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/feed.json")
                    .header("accept", FEED_ACCEPT);
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"listings": [{"title": "A"}]}"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/broken");
                then.status(500);
            })
            .await;

        let client = reqwest::Client::new();
        let feed = fetch_feed(&client, &server.url("/feed.json"))
            .await
            .expect("fetched");
        ok.assert_async().await;
        assert_eq!(feed.items.len(), 1);

        let err = fetch_feed(&client, &server.url("/broken"))
            .await
            .expect_err("500");
        assert!(matches!(err, IngestionError::FeedStatus { status: 500 }));

        let err = fetch_feed(&client, "  ").await.expect_err("blank url");
        assert!(matches!(err, IngestionError::MissingSource));
    }
}
