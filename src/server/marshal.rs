//! JSON marshaling for gateway responses.
//!
//! Mirrors the protobuf JSON mapping used by HTTP gateways: field names in
//! lowerCamelCase, declaration order preserved, and enums either as their
//! numeric value or their symbolic name.

use serde_json::{Map, Value, json};

use super::proto::{HealthzResponse, ServiceStatus};

/// How protobuf messages are rendered as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarshalOptions {
    /// Render enums as integers instead of names.
    pub use_enum_numbers: bool,
    /// Render scalar fields that hold their zero value.
    ///
    /// Fields with explicit presence are rendered iff set, even when set
    /// to zero.
    pub emit_unpopulated: bool,
}

impl MarshalOptions {
    /// Policy of the gateway bridge.
    pub const fn gateway() -> Self {
        Self {
            use_enum_numbers: true,
            emit_unpopulated: true,
        }
    }
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self::gateway()
    }
}

/// Messages the gateway knows how to render.
pub trait GatewayJson {
    fn to_gateway_json(&self, opts: &MarshalOptions) -> Value;
}

struct ObjectWriter<'a> {
    opts: &'a MarshalOptions,
    fields: Map<String, Value>,
}

impl<'a> ObjectWriter<'a> {
    fn new(opts: &'a MarshalOptions) -> Self {
        Self {
            opts,
            fields: Map::new(),
        }
    }

    /// Presence-tracked enum field.
    fn enum_field(
        &mut self,
        name: &str,
        value: Option<i32>,
        symbol: fn(i32) -> Option<&'static str>,
    ) {
        let Some(value) = value else { return };
        let rendered = match (self.opts.use_enum_numbers, symbol(value)) {
            (false, Some(symbolic)) => Value::from(symbolic),
            // Unknown values have no name and stay numeric.
            _ => Value::from(value),
        };
        self.fields.insert(name.to_string(), rendered);
    }

    fn string_field(&mut self, name: &str, value: &str) {
        if value.is_empty() && !self.opts.emit_unpopulated {
            return;
        }
        self.fields.insert(name.to_string(), Value::from(value));
    }

    fn finish(self) -> Value {
        Value::Object(self.fields)
    }
}

fn service_status_name(value: i32) -> Option<&'static str> {
    ServiceStatus::try_from(value).ok().map(|s| s.as_str_name())
}

impl GatewayJson for HealthzResponse {
    fn to_gateway_json(&self, opts: &MarshalOptions) -> Value {
        let mut w = ObjectWriter::new(opts);
        w.enum_field("status", self.status, service_status_name);
        w.string_field("timestamp", &self.timestamp);
        w.string_field("message", &self.message);
        w.finish()
    }
}

/// Error body in the `google.rpc.Status` JSON shape.
pub fn status_body(code: tonic::Code, message: &str) -> Value {
    json!({
        "code": code as i32,
        "message": message,
        "details": [],
    })
}
