//! Minimal Apple-style XML property list encode/decode for a single row,
//! used by both reference adapters (spec.md §6).
//!
//! Only the subset of the plist format needed to round-trip `Row`/`Value`
//! is implemented: a `<dict>` of `<key>` / typed-value pairs.

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use rra_core::{Attribute, Error, Result, Row, Scheme, Value};
use std::io::Cursor;
use std::sync::Arc;

/// Serializes `row` as an XML plist `<dict>` body (without the enclosing
/// `<plist>` root — callers wrap that themselves so the single-file
/// adapter can nest many rows under one root).
pub fn encode_row(row: &Row) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    encode_row_into(&mut writer, row)?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| Error::serialization(e.to_string()))
}

fn encode_row_into(writer: &mut Writer<Cursor<Vec<u8>>>, row: &Row) -> Result<()> {
    let to_io = |e: quick_xml::Error| Error::serialization(e.to_string());
    writer.write_event(Event::Start(BytesStart::new("dict"))).map_err(to_io)?;
    for attr in row.scheme().iter() {
        writer
            .write_event(Event::Start(BytesStart::new("key")))
            .map_err(to_io)?;
        writer
            .write_event(Event::Text(BytesText::new(attr.as_str())))
            .map_err(to_io)?;
        writer.write_event(Event::End(quick_xml::events::BytesEnd::new("key"))).map_err(to_io)?;
        encode_value(writer, &row.get(attr))?;
    }
    writer.write_event(Event::End(quick_xml::events::BytesEnd::new("dict"))).map_err(to_io)?;
    Ok(())
}

fn encode_value(writer: &mut Writer<Cursor<Vec<u8>>>, value: &Value) -> Result<()> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let to_io = |e: quick_xml::Error| Error::serialization(e.to_string());
    match value {
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new("null")))
                .map_err(to_io)?;
        }
        Value::Integer(v) => write_text_element(writer, "integer", &v.to_string())?,
        Value::Real(v) => write_text_element(writer, "real", &v.to_string())?,
        Value::Text(s) => write_text_element(writer, "string", s)?,
        Value::Blob(b) => write_text_element(writer, "data", &STANDARD.encode(b))?,
        Value::NotFound => {
            return Err(Error::serialization("NotFound cannot be serialized"));
        }
    }
    Ok(())
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) -> Result<()> {
    let to_io = |e: quick_xml::Error| Error::serialization(e.to_string());
    writer.write_event(Event::Start(BytesStart::new(tag))).map_err(to_io)?;
    writer.write_event(Event::Text(BytesText::new(text))).map_err(to_io)?;
    writer
        .write_event(Event::End(quick_xml::events::BytesEnd::new(tag)))
        .map_err(to_io)?;
    Ok(())
}

/// Parses a `<dict>` body produced by `encode_row` back into a `Row` over
/// `scheme`. The file is trusted to have been produced by `encode_row`
/// (or to match its shape) — malformed input surfaces as
/// `Error::SerializationError` rather than a panic.
pub fn decode_row(xml: &str, scheme: Arc<Scheme>) -> Result<Row> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let to_io = |e: quick_xml::Error| Error::serialization(e.to_string());

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut values: Vec<(String, Value)> = Vec::new();
    let mut pending_key: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(to_io)? {
            Event::Start(e) | Event::Empty(e) => {
                let name = e.name();
                let tag = std::str::from_utf8(name.as_ref()).map_err(|e| Error::serialization(e.to_string()))?.to_string();
                match tag.as_str() {
                    "dict" => {}
                    "key" => {
                        let text = read_text(&mut reader, &mut buf)?;
                        pending_key = Some(text);
                    }
                    "null" => {
                        let key = pending_key.take().ok_or_else(|| Error::serialization("value without key"))?;
                        values.push((key, Value::Null));
                    }
                    "integer" => {
                        let text = read_text(&mut reader, &mut buf)?;
                        let key = pending_key.take().ok_or_else(|| Error::serialization("value without key"))?;
                        let parsed: i64 = text.parse().map_err(|_| Error::serialization("malformed integer"))?;
                        values.push((key, Value::Integer(parsed)));
                    }
                    "real" => {
                        let text = read_text(&mut reader, &mut buf)?;
                        let key = pending_key.take().ok_or_else(|| Error::serialization("value without key"))?;
                        let parsed: f64 = text.parse().map_err(|_| Error::serialization("malformed real"))?;
                        values.push((key, Value::Real(parsed)));
                    }
                    "string" => {
                        let text = read_text(&mut reader, &mut buf)?;
                        let key = pending_key.take().ok_or_else(|| Error::serialization("value without key"))?;
                        values.push((key, Value::Text(text)));
                    }
                    "data" => {
                        let text = read_text(&mut reader, &mut buf)?;
                        let key = pending_key.take().ok_or_else(|| Error::serialization("value without key"))?;
                        let decoded = STANDARD
                            .decode(text.trim())
                            .map_err(|e| Error::serialization(e.to_string()))?;
                        values.push((key, Value::Blob(decoded)));
                    }
                    other => {
                        return Err(Error::serialization(format!("unexpected plist element <{other}>")));
                    }
                }
            }
            Event::End(e) if e.name().as_ref() == b"dict" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let ordered = scheme
        .iter()
        .map(|attr| {
            values
                .iter()
                .find(|(k, _)| k == attr.as_str())
                .map(|(_, v)| v.clone())
                .ok_or_else(|| Error::serialization(format!("missing attribute {attr}")))
        })
        .collect::<Result<Vec<_>>>()?;

    Row::new(scheme, ordered)
}

fn read_text(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<String> {
    let to_io = |e: quick_xml::Error| Error::serialization(e.to_string());
    match reader.read_event_into(buf).map_err(to_io)? {
        Event::Text(t) => t.unescape().map(|s| s.into_owned()).map_err(to_io),
        Event::End(_) => Ok(String::new()),
        _ => Err(Error::serialization("expected text content")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rra_core::Attribute;

    fn scheme() -> Arc<Scheme> {
        Arc::new(Scheme::new(vec![
            Attribute::new("id"),
            Attribute::new("name"),
            Attribute::new("score"),
            Attribute::new("tag"),
            Attribute::new("data"),
        ]))
    }

    #[test]
    fn round_trips_every_value_variant() {
        let row = Row::new(
            scheme(),
            vec![
                Value::Integer(42),
                Value::Text("cat".into()),
                Value::Real(3.5),
                Value::Null,
                Value::Blob(vec![1, 2, 3, 255]),
            ],
        )
        .unwrap();

        let xml = encode_row(&row).unwrap();
        let decoded = decode_row(&xml, scheme()).unwrap();
        assert_eq!(row, decoded);
    }
}
