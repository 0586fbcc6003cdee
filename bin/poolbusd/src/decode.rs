//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Offline decoding of captured bus traffic into JSON lines."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use poolbus_proto::{
    ChemistryView, ChlorinatorView, CircuitNameView, ClockView, FrameKind, FrameParser,
    HeatSetpointView, PumpStatusView, RawMessage, ScheduleView, StatusView,
};
use serde_json::{json, Value};

/// Result of decoding a capture.
#[derive(Debug, Default)]
pub struct Decoded {
    pub messages: Vec<Value>,
    pub rejected: usize,
}

/// Parse every message in `bytes`, counting the ones the parser rejected.
pub fn decode_stream(bytes: &[u8]) -> Decoded {
    let mut parser = FrameParser::new();
    let mut decoded = Decoded::default();
    for byte in bytes {
        match parser.feed(*byte) {
            Ok(Some(message)) => decoded.messages.push(describe(&message)),
            Ok(None) => {}
            Err(_) => decoded.rejected += 1,
        }
        while let Some(message) = parser.next_ready() {
            decoded.messages.push(describe(&message));
        }
    }
    decoded
}

/// JSON form of one message, with the decoded view when one applies.
pub fn describe(message: &RawMessage) -> Value {
    let mut value = json!({
        "kind": message.kind().as_str(),
        "dest": message.dest(),
        "source": message.source(),
        "action": format!("0x{:02X}", message.action()),
        "data": hex_bytes(message.data()),
    });
    if let Some(preamble) = message.preamble() {
        value["preamble"] = json!(preamble);
    }
    if let Some(view) = view(message) {
        value["view"] = view;
    }
    value
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn view(message: &RawMessage) -> Option<Value> {
    if message.kind() == FrameKind::Secondary {
        return ChlorinatorView::new(message).ok().map(|view| match view {
            ChlorinatorView::StatusRequest => json!({ "type": "chlorinator_status_request" }),
            ChlorinatorView::StatusReply { raw } => {
                json!({ "type": "chlorinator_status", "bytes": hex_bytes(&raw) })
            }
            ChlorinatorView::VersionRequest => json!({ "type": "chlorinator_version_request" }),
            ChlorinatorView::SetOutput { percent } => {
                json!({ "type": "chlorinator_output", "percent": percent })
            }
            ChlorinatorView::Salinity { ppm, status } => json!({
                "type": "chlorinator_salinity",
                "ppm": ppm,
                "ok": status.ok(),
                "status": status.to_string(),
            }),
            ChlorinatorView::Version { version, name } => {
                json!({ "type": "chlorinator_version", "version": version, "name": name })
            }
        });
    }

    if let Ok(status) = StatusView::new(message) {
        return Some(json!({
            "type": "status",
            "time": format!("{:02}:{:02}", status.hour(), status.minute()),
            "pool": status.pool(),
            "spa": status.spa(),
            "aux": (1..=7).filter_map(|n| status.aux(n)).collect::<Vec<_>>(),
            "celsius": status.celsius(),
            "service_mode": status.service_mode(),
            "heater_on": status.heater_on(),
            "solar_on": status.solar_on(),
            "pool_temp": status.pool_temp(),
            "spa_temp": status.spa_temp(),
            "air_temp": status.air_temp(),
            "solar_temp": status.solar_temp(),
        }));
    }
    if let Ok(pump) = PumpStatusView::new(message) {
        return Some(json!({
            "type": "pump_status",
            "running": pump.running(),
            "mode": pump.mode(),
            "drive_state": pump.drive_state(),
            "watts": pump.watts(),
            "rpm": pump.rpm(),
            "gpm": pump.gpm(),
            "ppc": pump.ppc(),
            "error": pump.error(),
            "timer": pump.timer(),
            "time": format!("{:02}:{:02}", pump.hour(), pump.minute()),
        }));
    }
    if let Ok(chem) = ChemistryView::new(message) {
        return Some(json!({
            "type": "chemistry",
            "ph": chem.ph(),
            "orp": chem.orp(),
            "ph_setpoint": chem.ph_setpoint(),
            "orp_setpoint": chem.orp_setpoint(),
            "tank1": chem.tank1(),
            "tank2": chem.tank2(),
            "calcium_hardness": chem.calcium_hardness(),
            "cya": chem.cya(),
            "total_alkalinity": chem.total_alkalinity(),
            "water_flow_alarm": chem.water_flow_alarm(),
        }));
    }
    if let Ok(heat) = HeatSetpointView::new(message) {
        return Some(json!({
            "type": "heat",
            "pool_temp": heat.pool_temp(),
            "spa_temp": heat.spa_temp(),
            "air_temp": heat.air_temp(),
            "pool_setpoint": heat.pool_setpoint(),
            "spa_setpoint": heat.spa_setpoint(),
            "pool_heat_mode": heat.pool_heat_mode().to_string(),
            "spa_heat_mode": heat.spa_heat_mode().to_string(),
        }));
    }
    if let Ok(clock) = ClockView::new(message) {
        return Some(json!({
            "type": "clock",
            "time": format!("{:02}:{:02}", clock.hour(), clock.minute()),
            "day_of_week": clock.day_of_week(),
            "date": format!("{:02}/{:02}/{:02}", clock.month(), clock.day(), clock.year()),
        }));
    }
    if let Ok(name) = CircuitNameView::new(message) {
        return Some(json!({
            "type": "circuit_name",
            "circuit": name.circuit(),
            "name": name.name(),
            "function": name.function(),
        }));
    }
    if let Ok(schedule) = ScheduleView::new(message) {
        return Some(json!({
            "type": "schedule",
            "id": schedule.id(),
            "schedule": schedule.entry().to_string(),
        }));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolbus_proto::parse_hex;

    #[test]
    fn decodes_capture_with_views() {
        let capture = parse_hex(
            "FF 00 FF A5 00 10 60 07 0F 0A 06 02 02 4A 08 AC 12 00 00 00 0A 00 0F 22 02 8A \
             10 02 00 12 4C 81 F1 10 03",
        )
        .expect("hex");
        let decoded = decode_stream(&capture);
        assert_eq!(decoded.rejected, 0);
        assert_eq!(decoded.messages.len(), 2);
        assert_eq!(decoded.messages[0]["view"]["type"], "pump_status");
        assert_eq!(decoded.messages[0]["view"]["rpm"], 2220);
        assert_eq!(decoded.messages[0]["source"], 0x60);
        assert_eq!(decoded.messages[1]["kind"], "secondary");
        assert_eq!(decoded.messages[1]["view"]["ppm"], 3800);
        assert_eq!(decoded.messages[1]["view"]["status"], "low flow");
    }

    #[test]
    fn stray_escape_before_status_reply() {
        let capture = parse_hex("10 10 02 00 01 4C 80 DF 10 03").expect("hex");
        let decoded = decode_stream(&capture);
        assert_eq!(decoded.rejected, 1);
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0]["view"]["type"], "chlorinator_status");
        assert_eq!(decoded.messages[0]["view"]["bytes"], "4C 80");
    }

    #[test]
    fn unknown_actions_have_no_view() {
        let message = RawMessage::primary(0x01, 0x10, 0x22, 0x86, &[6, 1]).expect("valid");
        let value = describe(&message);
        assert_eq!(value["action"], "0x86");
        assert_eq!(value["data"], "06 01");
        assert!(value.get("view").is_none());
    }
}
