//! Minimal SNMP v2c codec for the fixed set of printer OIDs the probe reads.
//!
//! Only what the poller needs: encoding a community-authenticated GET request
//! and decoding the matching RESPONSE PDU. Pure functions, no I/O - the
//! socket handling lives in the probe.

use std::fmt;

/// hrDeviceStatus for the first device table entry.
pub const OID_DEVICE_STATUS: &str = "1.3.6.1.2.1.25.3.2.1.5.1";

/// prtMarkerLifeCount - lifetime page counter.
pub const OID_LIFE_PAGE_COUNT: &str = "1.3.6.1.2.1.43.10.2.1.4.1.1";

/// prtMarkerSuppliesLevel - current toner level.
pub const OID_SUPPLY_LEVEL: &str = "1.3.6.1.2.1.43.11.1.1.9.1.1";

/// prtMarkerSuppliesMaxCapacity.
pub const OID_SUPPLY_MAX: &str = "1.3.6.1.2.1.43.11.1.1.8.1.1";

/// prtInputCurrentLevel - sheets remaining in the first input tray.
pub const OID_INPUT_LEVEL: &str = "1.3.6.1.2.1.43.8.2.1.10.1.1";

/// prtInputMaxCapacity.
pub const OID_INPUT_MAX: &str = "1.3.6.1.2.1.43.8.2.1.9.1.1";

/// Everything a poll cycle asks a printer for, in one GET.
pub const PRINTER_OIDS: &[&str] = &[
    OID_DEVICE_STATUS,
    OID_LIFE_PAGE_COUNT,
    OID_SUPPLY_LEVEL,
    OID_SUPPLY_MAX,
    OID_INPUT_LEVEL,
    OID_INPUT_MAX,
];

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

const PDU_GET_REQUEST: u8 = 0xA0;
const PDU_GET_RESPONSE: u8 = 0xA2;

const SNMP_VERSION_2C: i64 = 1;

pub type SnmpResult<T> = Result<T, SnmpCodecError>;

/// Errors produced while encoding or decoding an SNMP message.
#[derive(Debug, PartialEq, Eq)]
pub enum SnmpCodecError {
    /// Message ended before the announced length.
    Truncated,

    /// A tag other than the grammar allows at this position.
    UnexpectedTag(u8),

    /// The received PDU is not a GetResponse.
    UnexpectedPdu(u8),

    /// An integer field does not fit the decoder's width.
    IntegerOverflow,

    /// An object identifier could not be parsed or encoded.
    InvalidOid(String),
}

impl fmt::Display for SnmpCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpCodecError::Truncated => write!(f, "message truncated"),
            SnmpCodecError::UnexpectedTag(tag) => write!(f, "unexpected tag 0x{tag:02x}"),
            SnmpCodecError::UnexpectedPdu(tag) => write!(f, "unexpected PDU type 0x{tag:02x}"),
            SnmpCodecError::IntegerOverflow => write!(f, "integer field too wide"),
            SnmpCodecError::InvalidOid(oid) => write!(f, "invalid object identifier: {oid}"),
        }
    }
}

impl std::error::Error for SnmpCodecError {}

/// A decoded varbind value.
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Oid(String),
    /// Counter32, Gauge32, TimeTicks and Counter64 all land here.
    Counter(u64),
    IpAddress(String),
    Null,
    /// noSuchObject / noSuchInstance / endOfMibView.
    Absent,
}

impl SnmpValue {
    /// Render the value for the raw key/value sample, if it carries one.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SnmpValue::Integer(value) => Some(value.to_string()),
            SnmpValue::Counter(value) => Some(value.to_string()),
            SnmpValue::OctetString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            SnmpValue::Oid(oid) => Some(oid.clone()),
            SnmpValue::IpAddress(addr) => Some(addr.clone()),
            SnmpValue::Null | SnmpValue::Absent => None,
        }
    }
}

/// A decoded GetResponse PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct SnmpResponse {
    pub request_id: i64,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(String, SnmpValue)>,
}

/// Encode a v2c GET for the given OIDs.
pub fn encode_get(community: &str, request_id: i32, oids: &[&str]) -> SnmpResult<Vec<u8>> {
    encode_message(PDU_GET_REQUEST, community, request_id, oids)
}

fn encode_message(
    pdu_tag: u8,
    community: &str,
    request_id: i32,
    oids: &[&str],
) -> SnmpResult<Vec<u8>> {
    let mut varbinds = Vec::new();
    for oid in oids {
        let mut varbind = Vec::new();
        write_tlv(&mut varbind, TAG_OID, &encode_oid(oid)?);
        write_tlv(&mut varbind, TAG_NULL, &[]);

        write_tlv(&mut varbinds, TAG_SEQUENCE, &varbind);
    }

    let mut pdu = Vec::new();
    write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(request_id as i64));
    write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(0));
    write_tlv(&mut pdu, TAG_INTEGER, &encode_integer(0));
    write_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

    let mut message = Vec::new();
    write_tlv(&mut message, TAG_INTEGER, &encode_integer(SNMP_VERSION_2C));
    write_tlv(&mut message, TAG_OCTET_STRING, community.as_bytes());
    write_tlv(&mut message, pdu_tag, &pdu);

    let mut out = Vec::with_capacity(message.len() + 4);
    write_tlv(&mut out, TAG_SEQUENCE, &message);
    Ok(out)
}

/// Decode a v2c GetResponse message.
pub fn decode_response(buf: &[u8]) -> SnmpResult<SnmpResponse> {
    let mut outer = Reader::new(buf);
    let message = outer.expect_tlv(TAG_SEQUENCE)?;

    let mut reader = Reader::new(message);
    let _version = decode_integer(reader.expect_tlv(TAG_INTEGER)?)?;
    let _community = reader.expect_tlv(TAG_OCTET_STRING)?;

    let (pdu_tag, pdu) = reader.read_tlv()?;
    if pdu_tag != PDU_GET_RESPONSE {
        return Err(SnmpCodecError::UnexpectedPdu(pdu_tag));
    }

    let mut pdu_reader = Reader::new(pdu);
    let request_id = decode_integer(pdu_reader.expect_tlv(TAG_INTEGER)?)?;
    let error_status = decode_integer(pdu_reader.expect_tlv(TAG_INTEGER)?)?;
    let error_index = decode_integer(pdu_reader.expect_tlv(TAG_INTEGER)?)?;

    let mut varbinds = Vec::new();
    let mut list_reader = Reader::new(pdu_reader.expect_tlv(TAG_SEQUENCE)?);
    while !list_reader.is_empty() {
        let mut varbind = Reader::new(list_reader.expect_tlv(TAG_SEQUENCE)?);
        let oid = decode_oid(varbind.expect_tlv(TAG_OID)?)?;
        let (tag, content) = varbind.read_tlv()?;
        varbinds.push((oid, decode_value(tag, content)?));
    }

    Ok(SnmpResponse {
        request_id,
        error_status,
        error_index,
        varbinds,
    })
}

fn decode_value(tag: u8, content: &[u8]) -> SnmpResult<SnmpValue> {
    let value = match tag {
        TAG_INTEGER => SnmpValue::Integer(decode_integer(content)?),
        TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
        TAG_OID => SnmpValue::Oid(decode_oid(content)?),
        TAG_COUNTER32 | TAG_GAUGE32 | TAG_TIMETICKS | TAG_COUNTER64 => {
            SnmpValue::Counter(decode_unsigned(content)?)
        }
        TAG_IP_ADDRESS => {
            if content.len() != 4 {
                return Err(SnmpCodecError::UnexpectedTag(tag));
            }
            SnmpValue::IpAddress(format!(
                "{}.{}.{}.{}",
                content[0], content[1], content[2], content[3]
            ))
        }
        TAG_NULL => SnmpValue::Null,
        TAG_NO_SUCH_OBJECT | TAG_NO_SUCH_INSTANCE | TAG_END_OF_MIB_VIEW => SnmpValue::Absent,
        other => return Err(SnmpCodecError::UnexpectedTag(other)),
    };

    Ok(value)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_byte(&mut self) -> SnmpResult<u8> {
        let byte = *self.buf.get(self.pos).ok_or(SnmpCodecError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_len(&mut self) -> SnmpResult<usize> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }

        let count = (first & 0x7f) as usize;
        if count == 0 || count > 4 {
            return Err(SnmpCodecError::IntegerOverflow);
        }

        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.read_byte()? as usize;
        }
        Ok(len)
    }

    fn read_tlv(&mut self) -> SnmpResult<(u8, &'a [u8])> {
        let tag = self.read_byte()?;
        let len = self.read_len()?;

        let start = self.pos;
        let end = start.checked_add(len).ok_or(SnmpCodecError::Truncated)?;
        if end > self.buf.len() {
            return Err(SnmpCodecError::Truncated);
        }

        self.pos = end;
        Ok((tag, &self.buf[start..end]))
    }

    fn expect_tlv(&mut self, expected: u8) -> SnmpResult<&'a [u8]> {
        let (tag, content) = self.read_tlv()?;
        if tag != expected {
            return Err(SnmpCodecError::UnexpectedTag(tag));
        }
        Ok(content)
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    write_len(out, content.len());
    out.extend_from_slice(content);
}

fn write_len(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }

    let bytes = (len as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();

    // strip redundant leading bytes, keeping the sign intact
    let mut skip = 0;
    while skip < bytes.len() - 1 {
        let current = bytes[skip];
        let next_high = bytes[skip + 1] & 0x80 != 0;
        if (current == 0x00 && !next_high) || (current == 0xff && next_high) {
            skip += 1;
        } else {
            break;
        }
    }

    bytes[skip..].to_vec()
}

fn decode_integer(content: &[u8]) -> SnmpResult<i64> {
    if content.is_empty() || content.len() > 8 {
        return Err(SnmpCodecError::IntegerOverflow);
    }

    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for byte in content {
        value = (value << 8) | *byte as i64;
    }
    Ok(value)
}

fn decode_unsigned(content: &[u8]) -> SnmpResult<u64> {
    // Counter64 may carry a leading 0x00 to keep the sign bit clear
    let trimmed = if content.len() > 1 && content[0] == 0 {
        &content[1..]
    } else {
        content
    };

    if trimmed.is_empty() || trimmed.len() > 8 {
        return Err(SnmpCodecError::IntegerOverflow);
    }

    let mut value = 0u64;
    for byte in trimmed {
        value = (value << 8) | *byte as u64;
    }
    Ok(value)
}

fn encode_oid(oid: &str) -> SnmpResult<Vec<u8>> {
    let arcs: Vec<u64> = oid
        .split('.')
        .map(|arc| arc.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| SnmpCodecError::InvalidOid(oid.to_string()))?;

    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
        return Err(SnmpCodecError::InvalidOid(oid.to_string()));
    }

    let mut out = Vec::new();
    out.push((arcs[0] * 40 + arcs[1]) as u8);
    for arc in &arcs[2..] {
        write_base128(&mut out, *arc);
    }
    Ok(out)
}

fn write_base128(out: &mut Vec<u8>, mut arc: u64) {
    let mut groups = [0u8; 10];
    let mut count = 0;

    loop {
        groups[count] = (arc & 0x7f) as u8;
        count += 1;
        arc >>= 7;
        if arc == 0 {
            break;
        }
    }

    for index in (0..count).rev() {
        let mut byte = groups[index];
        if index != 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

fn decode_oid(content: &[u8]) -> SnmpResult<String> {
    if content.is_empty() {
        return Err(SnmpCodecError::InvalidOid("<empty>".to_string()));
    }

    let mut arcs: Vec<u64> = Vec::new();
    let first = content[0];
    if first < 80 {
        arcs.push((first / 40) as u64);
        arcs.push((first % 40) as u64);
    } else {
        arcs.push(2);
        arcs.push(first as u64 - 80);
    }

    let mut arc: u64 = 0;
    let mut in_progress = false;
    for byte in &content[1..] {
        arc = (arc << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 == 0 {
            arcs.push(arc);
            arc = 0;
            in_progress = false;
        } else {
            in_progress = true;
        }
    }

    if in_progress {
        return Err(SnmpCodecError::Truncated);
    }

    Ok(arcs
        .iter()
        .map(|arc| arc.to_string())
        .collect::<Vec<_>>()
        .join("."))
}
