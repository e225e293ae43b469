//! Wire format of the transit API: record-separated JSON frames on the live
//! feed, the negotiation response, and the station list.
//!
//! Every message on the live socket is a UTF-8 JSON object terminated by
//! ASCII Record Separator (0x1E). One socket message may carry several
//! records. Vehicle positions arrive as invocation frames whose second
//! argument is the position payload, itself JSON-encoded as a string.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

use crate::types::*;

/// ASCII Record Separator terminating every live feed message.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Token fields of the negotiation response, in lookup order.
const TOKEN_FIELDS: &[&str] = &["connectionToken", "ConnectionToken", "connectionId"];

/// Vehicle id fields of a position payload, in lookup order.
const VEHICLE_ID_FIELDS: &[&str] = &["VJourneyId", "VehicleJourneyId", "Id"];

// ---------------------------------------------------------------------------
// Outbound control frames
// ---------------------------------------------------------------------------

fn terminate(body: Value) -> String {
    let mut frame = body.to_string();
    frame.push(RECORD_SEPARATOR);
    frame
}

/// Protocol selection frame, sent first after the socket opens.
pub fn handshake_frame() -> String {
    terminate(json!({"protocol": "json", "version": 1}))
}

/// Subscription frame joining the line's vehicle channel.
pub fn join_frame(line: &LineRef) -> String {
    terminate(json!({
        "arguments": [line.channel()],
        "invocationId": "0",
        "target": "Join",
        "type": 1,
    }))
}

/// Both control frames, in send order.
pub fn control_frames(line: &LineRef) -> [String; 2] {
    [handshake_frame(), join_frame(line)]
}

// ---------------------------------------------------------------------------
// Inbound frames
// ---------------------------------------------------------------------------

/// Non-empty records of a raw socket message.
pub fn split_records(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(RECORD_SEPARATOR).filter(|chunk| !chunk.trim().is_empty())
}

/// Decode every vehicle fix carried by a raw socket message.
///
/// Records that are not valid JSON, invocations without a payload argument,
/// and payloads without a usable position or vehicle id are dropped.
pub fn decode_message(raw: &str) -> Vec<VehicleFix> {
    split_records(raw).flat_map(decode_record).collect()
}

/// Decode a single record. Returns an empty list for anything that is not a
/// positional vehicle update.
pub fn decode_record(record: &str) -> Vec<VehicleFix> {
    let frame: Value = match serde_json::from_str(record) {
        Ok(v) => v,
        Err(e) => {
            trace!(error = %e, "dropping malformed record");
            return Vec::new();
        }
    };

    let Some(payload) = frame
        .get("arguments")
        .and_then(Value::as_array)
        .filter(|args| args.len() > 1)
        .and_then(|args| args[1].as_str())
    else {
        return Vec::new();
    };

    let payload: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            trace!(error = %e, "dropping malformed payload");
            return Vec::new();
        }
    };

    match payload {
        Value::Array(items) => items.iter().filter_map(decode_payload).collect(),
        other => decode_payload(&other).into_iter().collect(),
    }
}

/// Turn one position payload object into a fix.
pub fn decode_payload(payload: &Value) -> Option<VehicleFix> {
    let lat = payload.get("Latitude").and_then(Value::as_f64)?;
    let lon = payload.get("Longitude").and_then(Value::as_f64)?;
    let vehicle_id = VEHICLE_ID_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).and_then(id_from_value));
    let Some(vehicle_id) = vehicle_id else {
        trace!("dropping position without vehicle id");
        return None;
    };
    let observed_at = payload
        .get("RecordedAtTime")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    Some(VehicleFix {
        vehicle_id,
        location: GeoPoint::new(lat, lon),
        observed_at,
    })
}

/// Identifiers show up as numbers or strings; empty strings count as absent.
pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an ISO 8601 timestamp. Values without an offset are local time.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Extract the session token from a negotiation response body.
pub fn parse_token(body: &Value) -> Option<String> {
    TOKEN_FIELDS
        .iter()
        .find_map(|field| {
            body.get(*field)
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
        })
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Station list
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StopsResponse {
    #[serde(default)]
    data: Vec<RawStop>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawStop {
    name: String,
    logical_stop_id: Value,
    latitude: f64,
    longitude: f64,
}

/// Parse the station list response into stop records, keeping route order.
pub fn parse_stops(body: &str) -> std::result::Result<Vec<StopRecord>, serde_json::Error> {
    let response: StopsResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .into_iter()
        .map(|raw| StopRecord {
            id: id_from_value(&raw.logical_stop_id).unwrap_or_default(),
            name: raw.name,
            location: GeoPoint::new(raw.latitude, raw.longitude),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn position_record(payload: Value) -> String {
        let frame = json!({
            "type": 1,
            "target": "VehiclePosition",
            "arguments": ["#lineId:1234:1", payload.to_string()],
        });
        format!("{frame}{RECORD_SEPARATOR}")
    }

    #[test]
    fn test_handshake_frame() {
        assert_eq!(handshake_frame(), "{\"protocol\":\"json\",\"version\":1}\u{1e}");
    }

    #[test]
    fn test_join_frame() {
        let frame = join_frame(&LineRef::new("1234", "1"));
        assert!(frame.ends_with(RECORD_SEPARATOR));
        let body: Value = serde_json::from_str(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(body["arguments"], json!(["#lineId:1234:1"]));
        assert_eq!(body["invocationId"], "0");
        assert_eq!(body["target"], "Join");
        assert_eq!(body["type"], 1);
    }

    #[test]
    fn test_control_frames_exact() {
        let [handshake, join] = control_frames(&LineRef::new("1234", "1"));
        assert_eq!(handshake, handshake_frame());
        assert_eq!(
            join,
            concat!(
                r##"{"arguments":["#lineId:1234:1"],"##,
                r#""invocationId":"0","target":"Join","type":1}"#,
                "\u{1e}"
            )
        );
    }

    #[test]
    fn test_decode_position() {
        let raw = position_record(json!({
            "VJourneyId": 98765,
            "Latitude": 49.4170,
            "Longitude": 2.8260,
            "RecordedAtTime": "2025-03-14T08:15:30Z",
        }));
        let fixes = decode_message(&raw);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].vehicle_id, "98765");
        assert_eq!(fixes[0].location, GeoPoint::new(49.4170, 2.8260));
        assert_eq!(
            fixes[0].observed_at.unwrap().to_rfc3339(),
            "2025-03-14T08:15:30+00:00"
        );
    }

    #[test]
    fn test_vehicle_id_lookup_order() {
        let both = json!({
            "VehicleJourneyId": "vj-2",
            "Id": "id-3",
            "Latitude": 1.0,
            "Longitude": 2.0,
        });
        assert_eq!(decode_payload(&both).unwrap().vehicle_id, "vj-2");
        let empty_first = json!({"VJourneyId": "", "Id": 7, "Latitude": 1.0, "Longitude": 2.0});
        assert_eq!(decode_payload(&empty_first).unwrap().vehicle_id, "7");
        let none = json!({"Latitude": 1.0, "Longitude": 2.0});
        assert!(decode_payload(&none).is_none());
    }

    #[test]
    fn test_heartbeat_without_position_ignored() {
        let raw = position_record(json!({"VJourneyId": "a", "Latitude": 49.4}));
        assert!(decode_message(&raw).is_empty());
        // A ping frame carries no arguments at all.
        assert!(decode_message("{\"type\":6}\u{1e}").is_empty());
    }

    #[test]
    fn test_zero_coordinates_are_positions() {
        let fix = decode_payload(&json!({"Id": "z", "Latitude": 0.0, "Longitude": 0.0}));
        assert_eq!(fix.unwrap().location, GeoPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_malformed_chunks_dropped() {
        let good = position_record(json!({"Id": "ok", "Latitude": 1.0, "Longitude": 2.0}));
        let raw = format!("{{not json{RECORD_SEPARATOR}{good}");
        let fixes = decode_message(&raw);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].vehicle_id, "ok");

        let bad_payload = "{\"arguments\":[\"x\",\"{broken\"]}\u{1e}";
        assert!(decode_message(bad_payload).is_empty());
        assert!(decode_message("").is_empty());
    }

    #[test]
    fn test_single_argument_frame_ignored() {
        let raw = "{\"type\":3,\"invocationId\":\"0\",\"arguments\":[\"ok\"]}\u{1e}";
        assert!(decode_message(raw).is_empty());
    }

    #[test]
    fn test_multiple_records_in_one_message() {
        let a = position_record(json!({"Id": "a", "Latitude": 1.0, "Longitude": 2.0}));
        let b = position_record(json!({"Id": "b", "Latitude": 3.0, "Longitude": 4.0}));
        let ids: Vec<_> = decode_message(&format!("{a}{b}"))
            .into_iter()
            .map(|f| f.vehicle_id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn test_payload_array() {
        let raw = position_record(json!([
            {"Id": "a", "Latitude": 1.0, "Longitude": 2.0},
            {"Id": "b"},
        ]));
        assert_eq!(decode_message(&raw).len(), 1);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2025-03-14T08:15:30+01:00").is_some());
        assert!(parse_timestamp("2025-03-14T08:15:30.250").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(
            parse_token(&json!({"connectionToken": "abc", "connectionId": "zzz"})),
            Some("abc".into())
        );
        assert_eq!(parse_token(&json!({"ConnectionToken": "def"})), Some("def".into()));
        assert_eq!(parse_token(&json!({"connectionId": "ghi"})), Some("ghi".into()));
        assert_eq!(parse_token(&json!({"negotiateVersion": 1})), None);
    }

    #[test]
    fn test_parse_stops() {
        let body = r#"{"Data":[
            {"Name":"Gare","LogicalStopId":501,"Latitude":49.4215,"Longitude":2.8237},
            {"Name":"Hôtel de Ville","LogicalStopId":"502","Latitude":49.4170,"Longitude":2.8260}
        ]}"#;
        let stops = parse_stops(body).unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].id, "501");
        assert_eq!(stops[1].id, "502");
        assert_eq!(stops[1].name, "Hôtel de Ville");
    }

    #[test]
    fn test_parse_stops_missing_data() {
        assert!(parse_stops("{}").unwrap().is_empty());
        assert!(parse_stops("[").is_err());
    }
}
