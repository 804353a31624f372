use std::{collections::HashMap, io};

use bytes::{BufMut, Bytes, BytesMut};
use ipp::{prelude::*, reader::IppReader};

// Operation codes the `ipp` crate has no names for (RFC 3995, RFC 3996).
pub const CREATE_PRINTER_SUBSCRIPTIONS: u16 = 0x0016;
pub const RENEW_SUBSCRIPTION: u16 = 0x001A;
pub const CANCEL_SUBSCRIPTION: u16 = 0x001B;
pub const GET_NOTIFICATIONS: u16 = 0x001C;

// Group delimiters. 0x06 and 0x07 are unknown to `ipp::model::DelimiterTag`.
pub const OPERATION_ATTRIBUTES: u8 = DelimiterTag::OperationAttributes as u8;
pub const END_OF_ATTRIBUTES: u8 = DelimiterTag::EndOfAttributes as u8;
pub const SUBSCRIPTION_ATTRIBUTES: u8 = 0x06;
pub const EVENT_NOTIFICATION_ATTRIBUTES: u8 = 0x07;

const BEG_COLLECTION: u8 = ValueTag::BegCollection as u8;
const END_COLLECTION: u8 = ValueTag::EndCollection as u8;

#[derive(Debug, Clone)]
pub struct AttributeGroup {
    pub tag: u8,
    pub attributes: HashMap<String, IppAttribute>,
}

/// A request or response with any group delimiter, including the subscription
/// and event notification groups.
#[derive(Debug, Clone)]
pub struct IppMessage {
    pub header: IppHeader,
    // Insertion ordered; the operation group must keep charset, language and uri first.
    groups: Vec<(u8, Vec<IppAttribute>)>,
}

impl IppMessage {
    pub fn request(operation: u16, printer_uri: &Uri) -> Self {
        let mut message = Self { header: IppHeader::new(IppVersion::v1_1(), operation, 1), groups: Vec::new() };
        message.add(OPERATION_ATTRIBUTES, IppAttribute::new(IppAttribute::ATTRIBUTES_CHARSET, IppValue::Charset("utf-8".to_string())));
        message.add(
            OPERATION_ATTRIBUTES,
            IppAttribute::new(IppAttribute::ATTRIBUTES_NATURAL_LANGUAGE, IppValue::NaturalLanguage("en".to_string())),
        );
        message.add(
            OPERATION_ATTRIBUTES,
            IppAttribute::new(IppAttribute::PRINTER_URI, IppValue::Uri(ipp::util::canonicalize_uri(printer_uri).to_string())),
        );
        message
    }

    /// Appends `attribute` to the first group tagged `tag`, opening one if needed.
    pub fn add(&mut self, tag: u8, attribute: IppAttribute) {
        match self.groups.iter_mut().find(|(group_tag, _)| *group_tag == tag) {
            Some((_, attributes)) => attributes.push(attribute),
            None => self.groups.push((tag, vec![attribute])),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::new();
        buffer.put(self.header.to_bytes());
        for (tag, attributes) in &self.groups {
            buffer.put_u8(*tag);
            for attribute in attributes {
                buffer.put(attribute.to_bytes());
            }
        }
        buffer.put_u8(END_OF_ATTRIBUTES);
        buffer.freeze()
    }
}

#[derive(Debug, Clone)]
pub struct IppResponse {
    pub header: IppHeader,
    pub groups: Vec<AttributeGroup>,
}

impl IppResponse {
    pub fn status_code(&self) -> StatusCode {
        self.header.status_code()
    }

    pub fn groups_of(&self, tag: u8) -> impl Iterator<Item = &AttributeGroup> {
        self.groups.iter().filter(move |group| group.tag == tag)
    }
}

/// Parses a complete response body. Collection values are skipped, nothing the
/// notification decoder reads is a collection.
pub fn parse_response(body: &[u8]) -> io::Result<IppResponse> {
    let mut reader = IppReader::new(io::Cursor::new(body));
    let header = reader.read_header()?;

    let mut groups: Vec<AttributeGroup> = Vec::new();
    let mut last_name: Option<String> = None;
    let mut collection_depth = 0usize;

    loop {
        let tag = reader.read_tag()?;
        if tag == END_OF_ATTRIBUTES {
            break;
        }

        if tag < 0x10 {
            groups.push(AttributeGroup { tag, attributes: HashMap::new() });
            last_name = None;
            continue;
        }

        let name = reader.read_name()?;
        let data = reader.read_value()?;

        match tag {
            BEG_COLLECTION => {
                collection_depth += 1;
                continue;
            }
            END_COLLECTION => {
                collection_depth = collection_depth.saturating_sub(1);
                continue;
            }
            _ if collection_depth > 0 => continue,
            _ => {}
        }

        let group = groups.last_mut().ok_or_else(|| invalid("value before the first attribute group"))?;
        if !well_formed(tag, &data) {
            return Err(invalid(&format!("malformed value for tag {tag:#04x}")));
        }
        let value = IppValue::parse(tag, data)?;

        if name.is_empty() {
            // Additional value of the previous attribute.
            let Some(attribute) = last_name.as_ref().and_then(|name| group.attributes.get_mut(name)) else {
                return Err(invalid("additional value without an attribute"));
            };
            let values = match attribute.value().clone() {
                IppValue::Array(mut values) => {
                    values.push(value);
                    values
                }
                first => vec![first, value],
            };
            *attribute = IppAttribute::new(attribute.name().to_string(), IppValue::Array(values));
        } else {
            group.attributes.insert(name.clone(), IppAttribute::new(&name, value));
            last_name = Some(name);
        }
    }

    Ok(IppResponse { header, groups })
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

// `IppValue::parse` reads fixed size and length prefixed fields without bounds checks.
fn well_formed(tag: u8, data: &[u8]) -> bool {
    match ValueTag::from_u8(tag) {
        Some(ValueTag::Integer | ValueTag::Enum) => data.len() == 4,
        Some(ValueTag::Boolean) => data.len() == 1,
        Some(ValueTag::RangeOfInteger) => data.len() == 8,
        Some(ValueTag::Resolution) => data.len() == 9,
        Some(ValueTag::DateTime) => data.len() == 11,
        Some(ValueTag::TextWithLanguage | ValueTag::NameWithLanguage) => {
            let Some(language_len) = length_prefix(data) else {
                return false;
            };
            data.get(2 + language_len..).and_then(length_prefix).is_some_and(|text_len| data.len() >= 4 + language_len + text_len)
        }
        _ => true,
    }
}

fn length_prefix(data: &[u8]) -> Option<usize> {
    match data {
        [high, low, ..] => Some(usize::from(u16::from_be_bytes([*high, *low]))),
        _ => None,
    }
}
