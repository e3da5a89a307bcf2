//! Mapping between tree values and OSC messages

use paramtree_core::{Device, Origin, Value};
use rosc::{OscArray, OscMessage, OscPacket, OscType};

use crate::error::OscError;

/// Largest datagram the receive loops accept
pub const MAX_PACKET_SIZE: usize = 65_507;

/// Build the message announcing `value` at `address`.
///
/// Floats and vector components travel as 32-bit floats. A top-level list
/// becomes one argument per element; nested lists and vectors inside a list
/// become OSC arrays.
pub fn value_message(address: impl Into<String>, value: &Value) -> OscMessage {
    OscMessage {
        addr: address.into(),
        args: value_to_args(value),
    }
}

pub fn value_to_args(value: &Value) -> Vec<OscType> {
    match value {
        Value::Vec2f(c) => c.iter().map(|x| OscType::Float(*x as f32)).collect(),
        Value::Vec3f(c) => c.iter().map(|x| OscType::Float(*x as f32)).collect(),
        Value::Vec4f(c) => c.iter().map(|x| OscType::Float(*x as f32)).collect(),
        Value::List(items) => items.iter().map(value_to_arg).collect(),
        scalar => vec![value_to_arg(scalar)],
    }
}

fn value_to_arg(value: &Value) -> OscType {
    match value {
        Value::Bool(b) => OscType::Bool(*b),
        Value::Int(i) => OscType::Int(*i),
        Value::Float(f) => OscType::Float(*f as f32),
        Value::Char(c) => OscType::Char(char::from(*c)),
        Value::String(s) => OscType::String(s.clone()),
        Value::Vec2f(_) | Value::Vec3f(_) | Value::Vec4f(_) => OscType::Array(OscArray {
            content: value_to_args(value),
        }),
        Value::List(items) => OscType::Array(OscArray {
            content: items.iter().map(value_to_arg).collect(),
        }),
    }
}

/// Interpret message arguments as a value.
///
/// One argument maps to a scalar and several map to a list; the receiving
/// parameter's conversion rules then take over (three floats become a
/// vec3f, for instance). Returns `None` for empty messages and for argument
/// kinds the tree has no type for.
pub fn args_to_value(args: Vec<OscType>) -> Option<Value> {
    match args.len() {
        0 => None,
        1 => args.into_iter().next().and_then(arg_to_value),
        _ => args
            .into_iter()
            .map(arg_to_value)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
    }
}

fn arg_to_value(arg: OscType) -> Option<Value> {
    match arg {
        OscType::Bool(b) => Some(Value::Bool(b)),
        OscType::Int(i) => Some(Value::Int(i)),
        OscType::Long(l) => Some(match i32::try_from(l) {
            Ok(i) => Value::Int(i),
            Err(_) => Value::Float(l as f64),
        }),
        OscType::Float(f) => Some(Value::Float(f64::from(f))),
        OscType::Double(d) => Some(Value::Float(d)),
        OscType::Char(c) => Some(Value::from(c)),
        OscType::String(s) => Some(Value::String(s)),
        OscType::Array(array) => array
            .content
            .into_iter()
            .map(arg_to_value)
            .collect::<Option<Vec<_>>>()
            .map(Value::List),
        _ => None,
    }
}

/// Decode a datagram, flattening bundles into their messages in order
pub fn decode_packet(bytes: &[u8]) -> Result<Vec<OscMessage>, OscError> {
    let (_, packet) =
        rosc::decoder::decode_udp(bytes).map_err(|e| OscError::Decode(format!("{:?}", e)))?;
    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(message) => out.push(message),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

pub fn encode_packet(packet: &OscPacket) -> Result<Vec<u8>, OscError> {
    rosc::encoder::encode(packet).map_err(|e| OscError::Encode(format!("{:?}", e)))
}

/// Route one inbound message to the parameter at its address.
///
/// Returns the value actually stored. Messages for unknown addresses, for
/// nodes without a parameter, or with unusable arguments are rejected.
pub fn apply_message(
    device: &Device,
    message: OscMessage,
    origin: Origin,
) -> Result<Value, OscError> {
    let node = device
        .find_node(&message.addr)
        .ok_or_else(|| OscError::PathNotFound(message.addr.clone()))?;
    let parameter = node
        .parameter()
        .ok_or_else(|| OscError::NoParameter(message.addr.clone()))?;
    let value = args_to_value(message.args)
        .ok_or_else(|| OscError::UnsupportedArguments(message.addr.clone()))?;
    Ok(parameter.apply(value, origin)?)
}
